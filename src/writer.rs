// 📝 Registration Writer - validate, stamp, append
// Nothing reaches the store unless every field is valid

use crate::clock::Clock;
use crate::error::RegisterError;
use crate::registration::Registration;
use crate::store::RowStore;
use crate::validation::{validate, RegistrationForm, RegistrationRules};
use std::sync::Arc;
use tracing::{error, info};

pub struct RegistrationWriter {
    store: Arc<dyn RowStore>,
    clock: Arc<dyn Clock>,
    rules: RegistrationRules,
}

impl RegistrationWriter {
    pub fn new(store: Arc<dyn RowStore>, clock: Arc<dyn Clock>, rules: RegistrationRules) -> Self {
        RegistrationWriter { store, clock, rules }
    }

    pub fn rules(&self) -> &RegistrationRules {
        &self.rules
    }

    pub async fn register(&self, form: &RegistrationForm) -> Result<Registration, RegisterError> {
        let valid = validate(form, &self.rules).map_err(RegisterError::Validation)?;

        let record = Registration::new(
            self.clock.now(),
            valid.name,
            valid.email,
            valid.category,
            valid.amount,
        );

        match self.store.append_row(&record).await {
            Ok(()) => {
                info!(
                    name = %record.name,
                    category = %record.category,
                    amount = %record.amount,
                    "Registration recorded"
                );
                Ok(record)
            }
            Err(e) => {
                error!(error = %e, backend = self.store.backend_tag(), "Failed to append registration");
                Err(e.into())
            }
        }
    }
}

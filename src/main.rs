use anyhow::{bail, Context, Result};
use pledge_registry::store::csv_file::write_csv;
use pledge_registry::{init_tracing, BackendKind, Config, RegisterError, RegistrationForm, Registry, SheetsStore};
use std::env;
use std::fs::File;
use std::path::Path;

const USAGE: &str = "usage: pledge-registry <command>

commands:
  stats                                    prize pool totals
  recent [n]                               newest registrations (name, category)
  register <name> <email> <category> <amt> add one registration
  init-sheet                               write the header row if the sheet is empty
  export <path>                            copy every registration to a CSV file";

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("{USAGE}");
        return Ok(());
    };

    let config = Config::from_env().context("loading configuration")?;

    match command.as_str() {
        "stats" => run_stats(&config).await,
        "recent" => run_recent(&config, args.get(1)).await,
        "register" => run_register(&config, &args[1..]).await,
        "init-sheet" => run_init_sheet(&config).await,
        "export" => match args.get(1) {
            Some(path) => run_export(&config, Path::new(path)).await,
            None => bail!("export needs a target path\n\n{USAGE}"),
        },
        other => bail!("unknown command '{other}'\n\n{USAGE}"),
    }
}

async fn run_stats(config: &Config) -> Result<()> {
    let registry = Registry::from_config(config);
    let stats = registry.stats().await.context("reading registrations")?;
    let summary = &stats.summary;

    println!("💰 {} - Pledged Prize Pool", config.event.title);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Total pledged:  ${:.2}", summary.total_amount);
    println!("Total climbers: {}", summary.participant_count);
    for (category, count) in &summary.category_counts {
        println!("  {category:<12} {count}");
    }
    if stats.stale {
        println!("⚠️  Sheet unreachable, showing data from {}", stats.last_updated);
    }

    Ok(())
}

async fn run_recent(config: &Config, limit: Option<&String>) -> Result<()> {
    let limit = limit
        .map(|raw| raw.parse::<usize>())
        .transpose()
        .context("recent count must be a whole number")?;

    let registry = Registry::from_config(config);
    let recent = registry.recent(limit).await.context("reading registrations")?;

    if recent.is_empty() {
        println!("No registrations yet. Be the first to register!");
    }
    for entry in recent {
        println!("🧗 {} ({}) joined!", entry.name, entry.category);
    }

    Ok(())
}

async fn run_register(config: &Config, fields: &[String]) -> Result<()> {
    let [name, email, category, amount] = fields else {
        bail!("register needs <name> <email> <category> <amount>\n\n{USAGE}");
    };

    let registry = Registry::from_config(config);
    let form = RegistrationForm::new(name.as_str(), email.as_str(), category.as_str(), amount.as_str());

    match registry.register(&form).await {
        Ok(record) => {
            println!("🎉 {} is registered!", record.name);
            println!("   Pledged ${:.2} - pay via {} or bring cash to check-in.", record.amount, config.event.payment_handle);
            Ok(())
        }
        Err(RegisterError::Validation(errors)) => {
            for err in &errors {
                eprintln!("❌ {}: {}", err.field, err.message);
            }
            bail!("registration rejected")
        }
        Err(RegisterError::Store(e)) => Err(e).context("registration failed"),
    }
}

async fn run_init_sheet(config: &Config) -> Result<()> {
    if config.backend == BackendKind::Sheets {
        let store = SheetsStore::from_config(&config.sheets, config.retry.clone());
        let written = store.ensure_header().await.context("checking worksheet header")?;
        if written {
            println!("✓ Header row written to '{}'", config.sheets.worksheet_name);
        } else {
            println!("✓ '{}' already has a header row", config.sheets.worksheet_name);
        }
        return Ok(());
    }

    let registry = Registry::from_config(config);
    registry.connect().await.context("preparing row store")?;
    println!("✓ {} row store ready", registry.backend_tag());
    Ok(())
}

async fn run_export(config: &Config, path: &Path) -> Result<()> {
    let registry = Registry::from_config(config);
    let rows = registry
        .all_registrations()
        .await
        .context("reading registrations")?;

    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    write_csv(file, &rows).with_context(|| format!("writing {}", path.display()))?;

    println!("✓ Exported {} registrations to {}", rows.len(), path.display());
    Ok(())
}

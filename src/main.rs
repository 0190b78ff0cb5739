use anyhow::Result;
use std::env;
use std::path::Path;

use fieldsync::{load_export_rows, run_sync, ConsoleReporter, RunConfig, SqliteStore};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: fieldsync <config.json>");
        eprintln!("       Runs one reconciliation pass over the configured export files.");
        std::process::exit(2);
    }

    run_once(Path::new(&args[1]))
}

fn run_once(config_path: &Path) -> Result<()> {
    println!("🌱 Fieldsync - maintenance work-order reconciliation");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    println!("\n⚙️  Loading config from {}...", config_path.display());
    let config = RunConfig::load(config_path)?;
    println!(
        "✓ Window {} → {}, {} activity groups, batch size {}",
        config.window.start,
        config.window.end,
        config.groups.len(),
        config.batch_size
    );

    println!("\n📂 Loading export files...");
    let rows = load_export_rows(&config.export_paths)?;
    println!(
        "✓ Loaded {} rows from {} file(s)",
        rows.len(),
        config.export_paths.len()
    );

    println!("\n🗄️  Opening store at {}...", config.database_path.display());
    let mut store = SqliteStore::open(&config.database_path)?;

    println!("\n🔄 Running reconciliation...\n");
    let report = run_sync(&config, &rows, &mut store, &ConsoleReporter)?;

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ Run {} complete", report.run_id);
    println!("   {}", report.summary());

    Ok(())
}

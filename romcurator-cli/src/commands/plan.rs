//! `plan` command: show what would be written.

use romcurator::config::ConfigFile;

use super::{resolve, CurateArgs};
use crate::error::CliError;

pub async fn run(args: CurateArgs, config: &ConfigFile) -> Result<(), CliError> {
    let resolved = resolve(&args, config).await?;

    println!("{}", resolved.dat.name());
    println!("{}", "=".repeat(resolved.dat.name().len()));

    for candidate in &resolved.candidates {
        println!();
        println!("{}", candidate);
        for pair in candidate.roms_with_files() {
            let patched = match pair.input().patch() {
                Some(patch) => format!(" (patched with {})", patch),
                None => String::new(),
            };
            println!(
                "  {} -> {}{}",
                pair.input(),
                pair.output().path().display(),
                patched
            );
        }
    }

    println!();
    println!(
        "{} of {} games can be written",
        resolved.candidates.len(),
        resolved.dat.games().len()
    );

    if !resolved.conflicts.is_empty() {
        println!();
        println!("Conflicts ({} candidates share output files):", resolved.conflicts.len());
        for candidate in &resolved.conflicts {
            println!("  {}", candidate.name());
        }
    }

    Ok(())
}

use anyhow::Result;
use dyntable::cli::process_command;

fn main() -> Result<()> {
    process_command()
}

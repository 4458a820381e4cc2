use std::path::PathBuf;

use clap::Args;

use rlc_learn::action::{disassemble, load_program};
use rlc_learn::{Error, Result};

#[derive(Args)]
pub struct DisassembleArgs {
    /// Binary action log, or `-` for standard input
    #[arg(default_value = "-")]
    pub action_file: PathBuf,
    /// Program (schema or compiled artifact) that defines the actions
    #[arg(short, long, value_name = "PROGRAM")]
    pub load: Option<PathBuf>,
    /// Write the text here instead of standard output
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn cmd_disassemble(args: DisassembleArgs) -> Result<()> {
    let program_path = args.load.ok_or_else(|| {
        Error::Usage("no program to decode with: pass --load <PROGRAM>".to_string())
    })?;
    let program = load_program(&program_path)?;

    let buffer = super::read_input(&args.action_file)?;
    let text = disassemble(&program, &buffer)?;
    super::write_output(args.output.as_deref(), text.as_bytes())?;
    Ok(())
}

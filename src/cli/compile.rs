use std::path::PathBuf;

use clap::Args;

use rlc_learn::action::program::{compile_program, ARTIFACT_EXTENSION};
use rlc_learn::action::schema::parse_schema;
use rlc_learn::{Error, ProgramError, Result};

#[derive(Args)]
pub struct CompileArgs {
    /// Action schema source
    pub schema: PathBuf,
    /// Output artifact (default: <schema>.rlcp)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn cmd_compile(args: CompileArgs) -> Result<()> {
    let source = std::fs::read_to_string(&args.schema).map_err(|source| ProgramError::Read {
        path: args.schema.clone(),
        source,
    })?;
    let program = parse_schema(&source, &args.schema)?;
    let artifact = compile_program(&program)?;

    let out_path = args
        .output
        .unwrap_or_else(|| args.schema.with_extension(ARTIFACT_EXTENSION));
    std::fs::write(&out_path, &artifact).map_err(Error::Io)?;

    eprintln!(
        "Compiled {} ({} actions) to {}",
        program.name,
        program.actions.len(),
        out_path.display()
    );
    Ok(())
}

//! Command-line interface for tether.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Bind native libraries through generated C glue", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the glue unit generated for a binding table
    Glue {
        /// Binding table (JSON)
        table: PathBuf,
        /// Name of the generated unit
        #[arg(long, default_value = "module0")]
        module: String,
        /// Print the shared ABI header instead
        #[arg(long)]
        header: bool,
    },
    /// Bind a library and call one of its functions
    Call {
        library: PathBuf,
        /// Binding table (JSON)
        table: PathBuf,
        function: String,
        /// Arguments, parsed according to the parameter types
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Compile traces for every function in a file
    Trace {
        file: PathBuf,
        /// Read the file as instruction assembly
        #[arg(long)]
        asm: bool,
        /// Bind a module and publish it as a global: NAME=LIBRARY:TABLE
        #[arg(long = "module", value_name = "NAME=LIB:TABLE")]
        modules: Vec<String>,
    },
}

/// A `--module` argument.
#[derive(Debug, PartialEq)]
pub struct ModuleArg {
    pub name: String,
    pub library: PathBuf,
    pub table: PathBuf,
}

impl ModuleArg {
    pub fn parse(arg: &str) -> Option<ModuleArg> {
        let (name, rest) = arg.split_once('=')?;
        let (library, table) = rest.rsplit_once(':')?;
        if name.is_empty() || library.is_empty() || table.is_empty() {
            return None;
        }
        Some(ModuleArg {
            name: name.to_owned(),
            library: library.into(),
            table: table.into(),
        })
    }
}

//! tether CLI entry point.

mod cli;

use std::fs;
use std::path::Path;

use clap::Parser;
use cli::{Cli, Command, ModuleArg};
use tether::{BindingTable, CallError, Error, Result, Session, Value};
use tether_abi::{HEADER_SOURCE, ModuleName};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("TETHER_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli.command) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Glue { table, module, header } => glue(&table, &module, header),
        Command::Call {
            library,
            table,
            function,
            args,
        } => call(&library, &table, &function, &args),
        Command::Trace { file, asm, modules } => trace(&file, asm, &modules),
    }
}

fn read_table(path: &Path) -> Result<BindingTable> {
    let text = fs::read_to_string(path)?;
    Ok(BindingTable::from_json(&text)?)
}

fn glue(table: &Path, module: &str, header: bool) -> Result<()> {
    if header {
        print!("{HEADER_SOURCE}");
        return Ok(());
    }
    let module: ModuleName = module.parse()?;
    let table = read_table(table)?;
    for entry in &table {
        entry.validate()?;
    }
    let unit = tether_glue::generate(&module, &table);
    print!("{}", unit.source);
    Ok(())
}

fn call(library: &Path, table: &Path, function: &str, args: &[String]) -> Result<()> {
    let session = Session::new();
    let module = session.bind(library, read_table(table)?)?;
    let Some(entry) = module.table().get(function) else {
        return Err(CallError::UnknownFunction {
            module: module.name().to_string(),
            function: function.to_owned(),
        }
        .into());
    };
    if entry.arity() != args.len() {
        return Err(CallError::ArityMismatch {
            function: function.to_owned(),
            expected: entry.arity(),
            found: args.len(),
        }
        .into());
    }
    let values = entry
        .params()
        .iter()
        .zip(args)
        .map(|(&ty, text)| {
            Value::parse_as(ty, text)
                .ok_or_else(|| Error::usage(format!("cannot read `{text}` as {}", ty.name())))
        })
        .collect::<Result<Vec<_>>>()?;
    let result = module.call(function, &values)?;
    println!("{result}");
    Ok(())
}

fn trace(file: &Path, asm: bool, modules: &[String]) -> Result<()> {
    let mut session = Session::new();
    for arg in modules {
        let module = ModuleArg::parse(arg)
            .ok_or_else(|| Error::usage(format!("expected NAME=LIBRARY:TABLE, got `{arg}`")))?;
        let table = read_table(&module.table)?;
        let handle = session.bind_as(&module.name, &module.library, table)?;
        tracing::info!(global = %module.name, module = %handle.name(), "module published");
    }

    let text = fs::read_to_string(file)?;
    let traces = if asm {
        session.trace_assembly(&text)?
    } else {
        session.trace_source(&text)?
    };
    for (i, trace) in traces.iter().enumerate() {
        if i > 0 {
            println!();
        }
        print!("{trace}");
        let natives = trace.native_calls();
        if natives.is_empty() {
            println!("native calls: none");
        } else {
            let labels: Vec<String> = natives
                .iter()
                .map(|call| format!("{} (%{})", call.label, call.node))
                .collect();
            println!("native calls: {}", labels.join(", "));
        }
    }
    Ok(())
}

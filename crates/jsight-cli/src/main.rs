use std::{env, fs, io, process::ExitCode};

use jsight::{Analysis, Analyzer, ContextKind, Payload};

const USAGE: &str = "usage: jsight [--pre FILE]... [--lookup NAME]... [--json] FILE";

fn main() -> ExitCode {
    let mut pre_files: Vec<String> = Vec::new();
    let mut lookups: Vec<String> = Vec::new();
    let mut json = false;
    let mut file: Option<String> = None;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--pre" => match args.next() {
                Some(path) => pre_files.push(path),
                None => {
                    eprintln!("error: --pre needs a file\n{USAGE}");
                    return ExitCode::FAILURE;
                }
            },
            "--lookup" => match args.next() {
                Some(name) => lookups.push(name),
                None => {
                    eprintln!("error: --lookup needs a name\n{USAGE}");
                    return ExitCode::FAILURE;
                }
            },
            "--json" => json = true,
            "--help" | "-h" => {
                println!("{USAGE}");
                return ExitCode::SUCCESS;
            }
            _ if file.is_none() => file = Some(arg),
            _ => {
                eprintln!("error: unexpected argument {arg:?}\n{USAGE}");
                return ExitCode::FAILURE;
            }
        }
    }
    let Some(file) = file else {
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    };

    let code = match read_file(&file) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {file}: {err}");
            return ExitCode::FAILURE;
        }
    };
    let mut analyzer = Analyzer::new(code);
    for path in &pre_files {
        match read_file(path) {
            Ok(precode) => analyzer.augment(&precode),
            Err(err) => {
                eprintln!("error: {path}: {err}");
                return ExitCode::FAILURE;
            }
        }
    }

    let analysis = match analyzer.annotate() {
        Ok(analysis) => analysis,
        Err(err) => {
            eprintln!("error: {file}: {err}");
            return ExitCode::FAILURE;
        }
    };

    if json {
        println!("{}", analysis.report().to_json());
    } else {
        print!("{analysis}");
    }

    for name in &lookups {
        println!();
        print_lookup(analysis, name);
    }
    ExitCode::SUCCESS
}

fn read_file(path: &str) -> io::Result<String> {
    fs::read_to_string(path)
}

fn print_lookup(analysis: &Analysis, name: &str) {
    let Some(id) = analysis.lookup(name) else {
        println!("{name}: not found");
        return;
    };
    let context = analysis.get(id);
    match context.kind() {
        ContextKind::Variable { .. } => {
            match context.value() {
                Some(value) => {
                    println!("{name}: [{}]", value.kinds(analysis.contexts()).join(", "));
                    for item in value.items() {
                        println!("  {item}");
                        // Dump the per-instance state behind references.
                        if let Payload::Reference(reference) = item.payload {
                            print!("{}", analysis.render_reference(reference, "    "));
                        }
                    }
                }
                None => println!("{name}: ?"),
            }
        }
        ContextKind::Function { .. } | ContextKind::Method { .. } => {
            println!("{name}: called {} times", context.called());
            if let Some(tally) = context.tally() {
                for conditional in tally.called_when().values() {
                    println!("  called {} times when {}", conditional.count, conditional.condition);
                }
            }
        }
        ContextKind::Class { .. } => {
            println!("{name}: constructed {} times", context.instanced());
        }
        _ => println!("{name}: (no printable summary)"),
    }
}

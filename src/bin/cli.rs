#![cfg(not(tarpaulin_include))]

use clap::Parser;
use sample_intake::config::{Args, init_logging};
use sample_intake::form::{Choice, FieldInput};
use sample_intake::reconcile::SampleReconciler;
use sample_intake::report::PdfReport;
use sample_intake::schema::{self, FORM_SCHEMA, FieldKind, IDENTIFIER_LABEL};
use sample_intake::session::{LookupState, SessionContext};
use std::io::{self, Write};

fn print_form(session: &SessionContext) {
    let mut index = 0;
    for section in FORM_SCHEMA {
        println!("── {} ──", section.title);
        for def in section.fields {
            let value = match session.form().input(def.label) {
                Some(FieldInput::Text(text)) => text.clone(),
                Some(FieldInput::Choice(Choice::Yes)) => "Sim".to_string(),
                Some(FieldInput::Choice(Choice::No)) => "Não".to_string(),
                Some(FieldInput::Choice(Choice::Unset)) | None => "-".to_string(),
            };
            println!("{:>3}  {:<45} {}", index, def.label, value);
            index += 1;
        }
    }
}

fn describe(state: &LookupState) -> String {
    match state {
        LookupState::Empty => "empty".to_string(),
        LookupState::New => "new".to_string(),
        LookupState::Loaded { row, match_count } if *match_count > 1 => {
            format!("row {} ({} matches, using the last)", row, match_count)
        }
        LookupState::Loaded { row, .. } => format!("row {}", row),
        LookupState::Error { message } => format!("error: {}", message),
    }
}

fn print_help() {
    println!("id <number>        look up a sample number");
    println!("set <n> <value>    set field n (yes/no fields take sim|nao)");
    println!("show               print the form");
    println!("submit             save to the sheet and render the PDF");
    println!("pdf <path>         write the last PDF to a file");
    println!("reset              clear the form");
    println!("q                  quit");
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_logging(&args.log_level);
    args.validate()?;

    let engine = SampleReconciler::new(args.open_store()?, &args.sheet_name);
    let renderer = PdfReport::default();
    let mut session = SessionContext::new();
    let mut status = String::from("ok");

    loop {
        print!("({}) > ", status);
        io::stdout().flush()?;

        let mut command = String::new();
        if io::stdin().read_line(&mut command)? == 0 {
            break;
        }
        let command = command.trim();
        let (verb, rest) = command.split_once(' ').unwrap_or((command, ""));

        status = match verb {
            "" => status,
            "q" | "quit" => break,
            "help" => {
                print_help();
                "ok".to_string()
            }
            "show" => {
                print_form(&session);
                describe(session.state())
            }
            "id" => describe(session.edit_identifier(&engine, rest)),
            "set" => {
                let (index, value) = rest.split_once(' ').unwrap_or((rest, ""));
                match index.parse::<usize>().ok().and_then(|i| schema::fields().nth(i)) {
                    Some(def) if def.kind() == FieldKind::Flag => {
                        session.form_mut().set_choice(def.label, Choice::from_form(value));
                        "ok".to_string()
                    }
                    Some(def) if def.label == IDENTIFIER_LABEL => {
                        describe(session.edit_identifier(&engine, value))
                    }
                    Some(def) => {
                        session.form_mut().set_text(def.label, value);
                        "ok".to_string()
                    }
                    None => "unknown field".to_string(),
                }
            }
            "submit" => match session.submit(&engine, &renderer) {
                Ok(outcome) if outcome.updated => format!("updated row {}", outcome.row),
                Ok(outcome) => format!("appended row {}", outcome.row),
                Err(e) => e.to_string(),
            },
            "pdf" => match session.report() {
                Some(report) => {
                    let path = if rest.is_empty() { report.file_name.as_str() } else { rest };
                    match std::fs::write(path, &report.bytes) {
                        Ok(()) => format!("wrote {}", path),
                        Err(e) => e.to_string(),
                    }
                }
                None => "nothing submitted yet".to_string(),
            },
            "reset" => {
                session = SessionContext::new();
                "ok".to_string()
            }
            _ => "unrecognized cmd".to_string(),
        };
    }

    Ok(())
}

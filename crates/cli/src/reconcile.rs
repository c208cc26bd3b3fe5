//! Line-driven reconciliation of a receive record.
//!
//! Plain lines are typed into a focused scanner field; lines starting with `:` are commands.
//! Once the inventory is completed, each box is given a storage location in turn.

use std::io::{self, BufRead};
use std::sync::mpsc;
use std::time::Instant;

use biobank_client::BackendClient;
use biobank_core::collaborators::{ExpectedSampleSource, StorageCommitter};
use biobank_core::input::{Key, KeyEvent, ScannerInput};
use biobank_core::scan::BoxFill;
use biobank_core::storage::LocationDraft;
use biobank_core::{
    CancellationToken, SampleError, SampleResult, ScanPolicy, ScanSession, StoragePlan,
};

const HELP: &str = "\
commands:
  <code>                      scan a sample code
  :box <code> [capacity]      select the active box
  :unexpected <code> <reason> record a code that is not expected
  :error <code> <reason>      mark an expected sample as error
  :note <code> <text>         attach notes to a sample
  :summary                    show counts
  :done                       complete the inventory
  :force                      complete with pending samples
  :quit                       leave without completing";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Scan(String),
    SelectBox { code: String, capacity: Option<u32> },
    Unexpected { code: String, reason: String },
    MarkError { code: String, reason: String },
    Note { code: String, text: String },
    Summary,
    Done { force: bool },
    Quit,
    Help,
}

fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix(':') else {
        return Ok(Command::Scan(line.to_string()));
    };

    let (name, args) = rest.split_once(' ').unwrap_or((rest, ""));
    let args = args.trim();
    let (first, tail) = args.split_once(' ').unwrap_or((args, ""));
    let (first, tail) = (first.to_string(), tail.trim().to_string());
    let need_code = |usage: &str| -> Result<(), String> {
        if first.is_empty() {
            Err(format!("usage: {usage}"))
        } else {
            Ok(())
        }
    };

    match name {
        "box" => {
            need_code(":box <code> [capacity]")?;
            let capacity = match tail.as_str() {
                "" => None,
                n => Some(n.parse().map_err(|_| format!("invalid capacity '{n}'"))?),
            };
            Ok(Command::SelectBox {
                code: first,
                capacity,
            })
        }
        "unexpected" => {
            need_code(":unexpected <code> <reason>")?;
            Ok(Command::Unexpected {
                code: first,
                reason: tail,
            })
        }
        "error" => {
            need_code(":error <code> <reason>")?;
            Ok(Command::MarkError {
                code: first,
                reason: tail,
            })
        }
        "note" => {
            need_code(":note <code> <text>")?;
            Ok(Command::Note {
                code: first,
                text: tail,
            })
        }
        "summary" => Ok(Command::Summary),
        "done" => Ok(Command::Done { force: false }),
        "force" => Ok(Command::Done { force: true }),
        "quit" => Ok(Command::Quit),
        "help" => Ok(Command::Help),
        other => Err(format!("unknown command ':{other}' (try :help)")),
    }
}

fn show(result: SampleResult<()>) {
    if let Err(e) = result {
        println!("! {}", e);
    }
}

/// Run the scan loop, then the storage walk.
pub async fn run(
    client: &BackendClient,
    receive_record_id: &str,
    policy: ScanPolicy,
    input: impl BufRead,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let expected = client.expected_samples(receive_record_id).await?;
    let mut session = ScanSession::new(receive_record_id, expected, policy);
    println!(
        "Receive record {}: {} expected samples. Type :help for commands.",
        receive_record_id,
        session.records().len()
    );

    let (tx, rx) = mpsc::channel();
    let mut scanner = ScannerInput::new(move |code| {
        let _ = tx.send(code);
    });
    scanner.focus();

    let mut lines = input.lines();
    let inventory = loop {
        let Some(line) = lines.next() else {
            println!("Input closed; inventory not completed.");
            return Ok(());
        };
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("! {}", e);
                continue;
            }
        };

        match command {
            Command::Scan(text) => {
                let now = Instant::now();
                for c in text.chars() {
                    scanner.handle(KeyEvent::new(Key::Char(c), now));
                }
                scanner.handle(KeyEvent::new(Key::Enter, now));
                for code in rx.try_iter() {
                    match session.scan(&code) {
                        Ok(outcome) => {
                            let marker = match outcome.fill {
                                BoxFill::Normal => "",
                                BoxFill::NearFull => " (nearly full)",
                                BoxFill::Full => " (full, select a new box)",
                            };
                            println!(
                                "{} -> {} [{}/{}]{}",
                                outcome.code,
                                outcome.box_code,
                                outcome.members,
                                outcome.capacity,
                                marker
                            );
                        }
                        Err(e) => println!("! {}", e),
                    }
                }
            }
            Command::SelectBox { code, capacity } => match session.select_box(&code, capacity) {
                Ok(b) => println!("Active box {} ({}/{})", b.code, b.len(), b.capacity),
                Err(e) => println!("! {}", e),
            },
            Command::Unexpected { code, reason } => {
                show(session.record_unexpected(&code, &reason))
            }
            Command::MarkError { code, reason } => show(session.mark_error(&code, &reason)),
            Command::Note { code, text } => show(session.annotate(&code, &text)),
            Command::Summary => {
                let s = session.summary();
                println!(
                    "expected {}, scanned {}, pending {}, errors {}, unexpected {}, boxes {}, active {}",
                    s.expected,
                    s.scanned,
                    s.pending,
                    s.errors,
                    s.unexpected,
                    s.boxes,
                    s.active_box.as_deref().unwrap_or("-")
                );
            }
            Command::Done { force } => match session.complete(client, force, cancel).await {
                Ok(report) => break report,
                Err(e) => println!("! {}", e),
            },
            Command::Quit => {
                println!("Leaving without completing the inventory.");
                return Ok(());
            }
            Command::Help => println!("{}", HELP),
        }
    };

    let mut plan = StoragePlan::from_report(receive_record_id, &inventory)?;
    println!("Inventory completed. Enter '<freezer> <shelf> <rack> <position>' per box, '<' to go back.");
    if !assign_storage(client, &mut plan, &mut lines, cancel).await? {
        println!("Leaving with storage unassigned.");
    }
    Ok(())
}

/// Walk the boxes of `plan`, then commit every location in one call.
///
/// A failed commit keeps the plan: an empty line retries, `<` reopens the last box and `:quit`
/// gives up. Returns whether storage was assigned.
async fn assign_storage<C: StorageCommitter>(
    committer: &C,
    plan: &mut StoragePlan,
    lines: &mut impl Iterator<Item = io::Result<String>>,
    cancel: &CancellationToken,
) -> anyhow::Result<bool> {
    loop {
        while let Some(box_code) = plan.current_box().map(str::to_string) {
            let (done, total) = plan.progress();
            println!("Box {} ({}/{}):", box_code, done + 1, total);

            let Some(line) = lines.next() else {
                anyhow::bail!("input closed before every box had a location");
            };
            let line = line?;
            if line.trim() == "<" {
                plan.back();
                continue;
            }

            let mut parts = line.split_whitespace().map(str::to_string);
            let draft = LocationDraft {
                freezer_id: parts.next(),
                shelf_level: parts.next(),
                rack_position: parts.next(),
                box_position: parts.next(),
            };
            if let Err(e) = plan.assign_current(&draft) {
                println!("! {}", e);
            }
        }

        loop {
            match plan.commit(committer, cancel).await {
                Ok(assignments) => {
                    println!("Storage assigned for {} boxes.", assignments.len());
                    return Ok(true);
                }
                Err(SampleError::Cancelled) => return Err(SampleError::Cancelled.into()),
                Err(e) => println!("! {}", e),
            }
            println!("Locations kept. Press Enter to retry, '<' to edit the last box, ':quit' to leave.");

            let Some(line) = lines.next() else {
                anyhow::bail!("input closed before storage was assigned");
            };
            match line?.trim() {
                ":quit" => return Ok(false),
                "<" => {
                    plan.back();
                    break;
                }
                _ => {}
            }
        }
    }
}

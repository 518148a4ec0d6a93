//! Debug Adapter Protocol (DAP) server for varlens.
//!
//! Serves one [`InspectionSession`] to VS Code and other DAP clients. The
//! debuggee is always stopped while requests are handled, so the whole
//! server runs on a single thread: read a request, answer it from the
//! session, then announce any stop the request caused.
//!
//! `variables` answers carry `indexedVariables` / `namedVariables` straight
//! from the session's descriptors. `evaluate` expressions that start with a
//! backtick go to the diagnostic console.

use std::io::{BufReader, BufWriter, Read, Write};
use std::sync::{Arc, Mutex};

use dap::prelude::*;
use dap::requests::Command;
use dap::responses::ResponseBody;
use dap::server::ServerOutput;
use dap::types::*;
use tracing::{debug, info, warn};

use varlens_core::{ExecutionState, ResumeKind, StopReason};
use varlens_rt::{EvaluateOutcome, InspectionSession, VariableDescriptor, Window};

// ─── Constants ──────────────────────────────────────────────────────────────

const THREAD_ID: i64 = 1;

// ─── Follow-up actions ──────────────────────────────────────────────────────

/// Work to do after a request has been answered. Events caused by a request
/// must reach the client after its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Followup {
    Nothing,
    /// Configuration finished: report where the debuggee is stopped.
    AnnounceStop,
    Resume(ResumeKind),
}

// ─── Public Entry Point ─────────────────────────────────────────────────────

/// Run the DAP server, reading from stdin and writing to stdout.
pub fn run_dap_server(session: InspectionSession) {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let reader = BufReader::new(stdin.lock());
    let writer = BufWriter::new(stdout.lock());

    run_dap_server_on(reader, writer, session);
}

/// Run the DAP server on arbitrary Read/Write streams (testable).
pub fn run_dap_server_on<R: Read, W: Write>(
    reader: BufReader<R>,
    writer: BufWriter<W>,
    mut session: InspectionSession,
) {
    let mut server = Server::new(reader, writer);
    let server_output = server.output.clone();

    info!(generation = session.generation(), "dap server started");
    run_dap_io_loop(&mut server, &server_output, &mut session);
    info!("dap server stopped");
}

// ─── DAP I/O Loop ───────────────────────────────────────────────────────────

fn run_dap_io_loop<R: Read, W: Write>(
    server: &mut Server<R, W>,
    server_output: &Arc<Mutex<ServerOutput<W>>>,
    session: &mut InspectionSession,
) {
    let mut running = true;

    while running {
        match server.poll_request() {
            Ok(Some(req)) => {
                let (resp, followup) = handle_request(&req, server_output, session, &mut running);
                if let Some(resp) = resp {
                    if server.respond(resp).is_err() {
                        running = false;
                    }
                }
                run_followup(followup, server_output, session);
            }
            Ok(None) => {
                debug!("client closed the connection");
                running = false;
            }
            Err(err) => {
                warn!(?err, "failed to read request");
                running = false;
            }
        }
    }
}

fn handle_request<W: Write>(
    req: &Request,
    server_output: &Arc<Mutex<ServerOutput<W>>>,
    session: &mut InspectionSession,
    running: &mut bool,
) -> (Option<Response>, Followup) {
    match &req.command {
        Command::Initialize(_args) => {
            let caps = types::Capabilities {
                supports_configuration_done_request: Some(true),
                supports_terminate_request: Some(true),
                ..Default::default()
            };
            send_initialized_event(server_output);
            (
                Some(req.clone().success(ResponseBody::Initialize(caps))),
                Followup::Nothing,
            )
        }

        Command::Launch(_args) => (
            Some(req.clone().success(ResponseBody::Launch)),
            Followup::Nothing,
        ),

        Command::ConfigurationDone => (
            Some(req.clone().success(ResponseBody::ConfigurationDone)),
            Followup::AnnounceStop,
        ),

        Command::Threads => {
            let threads = vec![Thread {
                id: THREAD_ID,
                name: "main".to_string(),
            }];
            (
                Some(
                    req.clone()
                        .success(ResponseBody::Threads(responses::ThreadsResponse {
                            threads,
                        })),
                ),
                Followup::Nothing,
            )
        }

        Command::StackTrace(_args) => {
            let stack_frames: Vec<StackFrame> = match session.frames() {
                Ok(frames) => frames
                    .into_iter()
                    .map(|f| StackFrame {
                        id: f.id as i64,
                        name: f.name,
                        line: 0,
                        column: 0,
                        ..Default::default()
                    })
                    .collect(),
                Err(err) => {
                    debug!(%err, "no frames");
                    Vec::new()
                }
            };
            let total = stack_frames.len() as i64;
            (
                Some(req.clone().success(ResponseBody::StackTrace(
                    responses::StackTraceResponse {
                        stack_frames,
                        total_frames: Some(total),
                    },
                ))),
                Followup::Nothing,
            )
        }

        Command::Scopes(args) => {
            let resp = match usize::try_from(args.frame_id) {
                Ok(frame) => match session.scopes(frame) {
                    Ok(scopes) => {
                        let scopes = scopes
                            .into_iter()
                            .map(|s| Scope {
                                name: s.name,
                                variables_reference: s.variables_reference,
                                expensive: s.expensive,
                                ..Default::default()
                            })
                            .collect();
                        req.clone()
                            .success(ResponseBody::Scopes(responses::ScopesResponse { scopes }))
                    }
                    Err(err) => req.clone().error(&err.to_string()),
                },
                Err(_) => req.clone().error(&format!("invalid frame id {}", args.frame_id)),
            };
            (Some(resp), Followup::Nothing)
        }

        Command::Variables(args) => {
            let window = Window::from_protocol(args.start, args.count);
            let outcome = session.variables(args.variables_reference, window);
            if let Some(diagnostic) = &outcome.diagnostic {
                send_output_event(server_output, diagnostic, OutputEventCategory::Console);
            }
            let variables = outcome.variables.into_iter().map(to_dap_variable).collect();
            (
                Some(req.clone().success(ResponseBody::Variables(
                    responses::VariablesResponse { variables },
                ))),
                Followup::Nothing,
            )
        }

        Command::Evaluate(args) => {
            let frame = args
                .frame_id
                .and_then(|f| usize::try_from(f).ok())
                .unwrap_or(0);
            let resp = match session.evaluate(frame, &args.expression) {
                Ok(outcome) => req
                    .clone()
                    .success(ResponseBody::Evaluate(to_evaluate_response(outcome))),
                Err(err) => req.clone().error(&err.to_string()),
            };
            (Some(resp), Followup::Nothing)
        }

        Command::Continue(_) => (
            Some(
                req.clone()
                    .success(ResponseBody::Continue(responses::ContinueResponse {
                        all_threads_continued: Some(true),
                    })),
            ),
            Followup::Resume(ResumeKind::Continue),
        ),

        Command::Next(_) => (
            Some(req.clone().success(ResponseBody::Next)),
            Followup::Resume(ResumeKind::StepOver),
        ),

        Command::StepIn(_) => (
            Some(req.clone().success(ResponseBody::StepIn)),
            Followup::Resume(ResumeKind::StepIn),
        ),

        Command::StepOut(_) => (
            Some(req.clone().success(ResponseBody::StepOut)),
            Followup::Resume(ResumeKind::StepOut),
        ),

        Command::Disconnect(_) => {
            *running = false;
            (
                Some(req.clone().success(ResponseBody::Disconnect)),
                Followup::Nothing,
            )
        }

        Command::Terminate(_) => {
            *running = false;
            (
                Some(req.clone().success(ResponseBody::Terminate)),
                Followup::Nothing,
            )
        }

        // Unhandled commands are acknowledged.
        _ => (req.clone().ack().ok(), Followup::Nothing),
    }
}

fn run_followup<W: Write>(
    followup: Followup,
    server_output: &Arc<Mutex<ServerOutput<W>>>,
    session: &mut InspectionSession,
) {
    match followup {
        Followup::Nothing => {}
        Followup::AnnounceStop => match session.stop_reason() {
            Some(reason) => send_stopped_event(server_output, reason),
            None => send_terminated_event(server_output),
        },
        Followup::Resume(kind) => match session.resume(kind) {
            Ok(ExecutionState::Stopped(reason)) => send_stopped_event(server_output, reason),
            Ok(ExecutionState::Exited) => send_terminated_event(server_output),
            Err(err) => {
                warn!(%err, "resume failed");
                send_output_event(server_output, &err.to_string(), OutputEventCategory::Stderr);
                send_terminated_event(server_output);
            }
        },
    }
}

// ─── Conversions ────────────────────────────────────────────────────────────

fn to_dap_variable(descriptor: VariableDescriptor) -> Variable {
    Variable {
        name: descriptor.name,
        value: descriptor.value,
        type_field: (!descriptor.type_name.is_empty()).then_some(descriptor.type_name),
        variables_reference: descriptor.variables_reference,
        named_variables: descriptor.named_variables.map(|n| n as i64),
        indexed_variables: descriptor.indexed_variables.map(|n| n as i64),
        ..Default::default()
    }
}

fn to_evaluate_response(outcome: EvaluateOutcome) -> responses::EvaluateResponse {
    match outcome {
        EvaluateOutcome::Console(text) => responses::EvaluateResponse {
            result: text,
            type_field: None,
            presentation_hint: None,
            variables_reference: 0,
            named_variables: None,
            indexed_variables: None,
            memory_reference: None,
        },
        EvaluateOutcome::Value(d) => responses::EvaluateResponse {
            result: d.value,
            type_field: (!d.type_name.is_empty()).then_some(d.type_name),
            presentation_hint: None,
            variables_reference: d.variables_reference,
            named_variables: d.named_variables.map(|n| n as i64),
            indexed_variables: d.indexed_variables.map(|n| n as i64),
            memory_reference: None,
        },
    }
}

fn stopped_event_reason(reason: StopReason) -> StoppedEventReason {
    match reason {
        StopReason::Entry => StoppedEventReason::Entry,
        StopReason::Breakpoint => StoppedEventReason::Breakpoint,
        StopReason::Step => StoppedEventReason::Step,
        StopReason::Pause => StoppedEventReason::Pause,
        StopReason::Exception => StoppedEventReason::Exception,
    }
}

// ─── Event Helpers ──────────────────────────────────────────────────────────

fn send_initialized_event<W: Write>(server_output: &Arc<Mutex<ServerOutput<W>>>) {
    if let Ok(mut out) = server_output.lock() {
        let _ = out.send_event(Event::Initialized);
    }
}

fn send_stopped_event<W: Write>(server_output: &Arc<Mutex<ServerOutput<W>>>, reason: StopReason) {
    let body = events::StoppedEventBody {
        reason: stopped_event_reason(reason),
        description: None,
        thread_id: Some(THREAD_ID),
        preserve_focus_hint: Some(false),
        text: None,
        all_threads_stopped: Some(true),
        hit_breakpoint_ids: None,
    };
    if let Ok(mut out) = server_output.lock() {
        let _ = out.send_event(Event::Stopped(body));
    }
}

fn send_terminated_event<W: Write>(server_output: &Arc<Mutex<ServerOutput<W>>>) {
    if let Ok(mut out) = server_output.lock() {
        let _ = out.send_event(Event::Terminated(None));
    }
}

/// Write one line to the client's debug console.
fn send_output_event<W: Write>(
    server_output: &Arc<Mutex<ServerOutput<W>>>,
    line: &str,
    category: OutputEventCategory,
) {
    let body = events::OutputEventBody {
        category: Some(category),
        output: format!("{}\n", line),
        ..Default::default()
    };
    if let Ok(mut out) = server_output.lock() {
        let _ = out.send_event(Event::Output(body));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(indexed: Option<usize>) -> VariableDescriptor {
        VariableDescriptor {
            name: "v".into(),
            value: "{...}".into(),
            type_name: "Indexed".into(),
            variables_reference: 7,
            indexed_variables: indexed,
            named_variables: None,
        }
    }

    #[test]
    fn variable_carries_counts() {
        let v = to_dap_variable(descriptor(Some(1)));
        assert_eq!(v.indexed_variables, Some(1));
        assert_eq!(v.named_variables, None);
        assert_eq!(v.type_field.as_deref(), Some("Indexed"));
        assert_eq!(v.variables_reference, 7);
    }

    #[test]
    fn empty_type_is_omitted() {
        let mut d = descriptor(None);
        d.type_name.clear();
        assert_eq!(to_dap_variable(d).type_field, None);
    }

    #[test]
    fn console_evaluate_has_no_reference() {
        let r = to_evaluate_response(EvaluateOutcome::Console("['Indexed']".into()));
        assert_eq!(r.result, "['Indexed']");
        assert_eq!(r.variables_reference, 0);
        let v = to_evaluate_response(EvaluateOutcome::Value(descriptor(Some(3))));
        assert_eq!(v.indexed_variables, Some(3));
        assert_eq!(v.result, "{...}");
    }

    #[test]
    fn stop_reasons_map_to_events() {
        assert!(matches!(stopped_event_reason(StopReason::Entry), StoppedEventReason::Entry));
        assert!(matches!(
            stopped_event_reason(StopReason::Breakpoint),
            StoppedEventReason::Breakpoint
        ));
        assert!(matches!(stopped_event_reason(StopReason::Step), StoppedEventReason::Step));
    }
}

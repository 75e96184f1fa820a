//! AST-level test for discarded results on the sync and motor paths.
//!
//! A dropped `Result` on these calls loses a display edit, a knob snap or a
//! motor release without a log line:
//!
//! | call | fails when |
//! |---|---|
//! | `inbox.send(..)` | the control loop has stopped |
//! | `sender.send(..)` / `link.send_text(..)` | the other side disconnected |
//! | `knob.command(..)` | the motor rejected the command |
//! | `knob.stop()` | the motor could not be released |
//! | `sink.close()` | the close handshake failed |
//!
//! Three ways of throwing the result away are rejected:
//!
//! ```ignore
//! let _ = knob.stop().await;        // wildcard binding
//! inbox.send(message).await;        // bare statement
//! knob.command(cmd).await.ok();     // .ok() as a statement
//! ```
//!
//! `close` is only checked for the first and last forms, since
//! `PeerLink::close` consumes the link and returns nothing.

use std::fs;
use std::path::Path;
use syn::visit::Visit;
use syn::{Expr, ExprMethodCall, File, Pat, Stmt};
use walkdir::WalkDir;

/// Methods whose results must be looked at
const GUARDED: &[(&str, &str)] = &[
    ("send", "channel or socket send"),
    ("send_text", "peer link send"),
    ("command", "motor command"),
    ("stop", "motor release"),
    ("close", "close handshake"),
];

/// Methods that return `()` somewhere in the crate, so a bare statement is fine
const UNIT_OK: &[&str] = &["close"];

#[derive(Debug, Clone, Copy, PartialEq)]
enum Discard {
    Wildcard,
    Bare,
    Ok,
}

struct Violation {
    file: String,
    method: String,
    how: Discard,
}

struct DiscardVisitor {
    file: String,
    violations: Vec<Violation>,
}

impl DiscardVisitor {
    fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            violations: Vec::new(),
        }
    }

    fn record(&mut self, call: &ExprMethodCall, how: Discard) {
        let method = call.method.to_string();
        if !GUARDED.iter().any(|(name, _)| *name == method) {
            return;
        }
        if how == Discard::Bare && UNIT_OK.contains(&method.as_str()) {
            return;
        }
        self.violations.push(Violation {
            file: self.file.clone(),
            method,
            how,
        });
    }
}

/// The method call under an optional `.await`
fn guarded_call(expr: &Expr) -> Option<&ExprMethodCall> {
    match expr {
        Expr::MethodCall(call) => Some(call),
        Expr::Await(await_expr) => match &*await_expr.base {
            Expr::MethodCall(call) => Some(call),
            _ => None,
        },
        _ => None,
    }
}

impl<'ast> Visit<'ast> for DiscardVisitor {
    fn visit_stmt(&mut self, stmt: &'ast Stmt) {
        match stmt {
            Stmt::Local(local) if matches!(local.pat, Pat::Wild(_)) => {
                if let Some(call) = local.init.as_ref().and_then(|i| guarded_call(&i.expr)) {
                    self.record(call, Discard::Wildcard);
                }
            }
            Stmt::Expr(expr, Some(_)) => {
                if let Some(call) = guarded_call(expr) {
                    if call.method == "ok" && call.args.is_empty() {
                        if let Some(inner) = guarded_call(&call.receiver) {
                            self.record(inner, Discard::Ok);
                        }
                    } else {
                        self.record(call, Discard::Bare);
                    }
                }
            }
            _ => {}
        }

        syn::visit::visit_stmt(self, stmt);
    }
}

fn check_source(file: &str, source: &str) -> Vec<Violation> {
    let syntax: File = syn::parse_file(source).expect("source should parse");
    let mut visitor = DiscardVisitor::new(file);
    visitor.visit_file(&syntax);
    visitor.violations
}

fn check_file(path: &Path) -> Vec<Violation> {
    let Ok(content) = fs::read_to_string(path) else {
        return vec![];
    };
    match syn::parse_file(&content) {
        Ok(syntax) => {
            let mut visitor = DiscardVisitor::new(path.display().to_string());
            visitor.visit_file(&syntax);
            visitor.violations
        }
        Err(e) => {
            eprintln!("Warning: Failed to parse {}: {}", path.display(), e);
            vec![]
        }
    }
}

fn kinds(violations: &[Violation]) -> Vec<(&str, Discard)> {
    violations
        .iter()
        .map(|v| (v.method.as_str(), v.how))
        .collect()
}

// =============================================================================
// Detector checks
// =============================================================================

#[test]
fn flags_wildcard_inbox_send() {
    let found = check_source(
        "inline.rs",
        r#"
        async fn forward(inbox: mpsc::Sender<ClientMessage>) {
            let _ = inbox.send(ClientMessage::GetState).await;
        }
        "#,
    );
    assert_eq!(kinds(&found), vec![("send", Discard::Wildcard)]);
}

#[test]
fn flags_bare_socket_send() {
    let found = check_source(
        "inline.rs",
        r#"
        async fn forward(sender: &mut SplitSink<WebSocket, Message>, text: String) {
            sender.send(Message::Text(text.into())).await;
        }
        "#,
    );
    assert_eq!(kinds(&found), vec![("send", Discard::Bare)]);
}

#[test]
fn flags_discarded_knob_calls() {
    let found = check_source(
        "inline.rs",
        r#"
        async fn shutdown(knob: &dyn Knob, cmd: MotorCommand) {
            knob.command(cmd).await.ok();
            let _ = knob.stop().await;
            knob.stop().await;
        }
        "#,
    );
    assert_eq!(
        kinds(&found),
        vec![
            ("command", Discard::Ok),
            ("stop", Discard::Wildcard),
            ("stop", Discard::Bare),
        ]
    );
}

#[test]
fn flags_discarded_peer_link_send() {
    let found = check_source(
        "inline.rs",
        r#"
        async fn push(link: &mut PeerLink, text: String) {
            let _ = link.send_text(text).await;
        }
        "#,
    );
    assert_eq!(kinds(&found), vec![("send_text", Discard::Wildcard)]);
}

#[test]
fn close_needs_handling_only_when_it_returns_a_result() {
    let found = check_source(
        "inline.rs",
        r#"
        async fn teardown(link: PeerLink, sink: &mut SplitSink<WebSocket, Message>) {
            link.close().await;
            let _ = sink.close().await;
            sink.close().await.ok();
        }
        "#,
    );
    assert_eq!(
        kinds(&found),
        vec![("close", Discard::Wildcard), ("close", Discard::Ok)]
    );
}

#[test]
fn handled_results_pass() {
    let found = check_source(
        "inline.rs",
        r#"
        async fn run(inbox: mpsc::Sender<ClientMessage>, knob: &dyn Knob) -> Result<()> {
            if inbox.send(ClientMessage::GetState).await.is_err() {
                warn!("control loop gone");
            }
            if let Err(e) = knob.stop().await {
                warn!("{}", e);
            }
            let pos = knob.command(MotorCommand::hold(0.0)).await?;
            knob.command(MotorCommand::hold(pos)).await?;
            Ok(())
        }
        "#,
    );
    assert!(found.is_empty());
}

// =============================================================================
// Crate scan
// =============================================================================

/// Files allowed to drop results.
/// Format: (file suffix, reason)
const ALLOWLIST: &[(&str, &str)] = &[
    // Renders and state replies with nobody listening are expected
    ("bus/mod.rs", "Broadcast bus has no required receivers"),
];

fn is_allowed(file: &str) -> bool {
    ALLOWLIST.iter().any(|(suffix, _)| file.ends_with(suffix))
}

#[test]
fn no_discarded_results_in_src() {
    let src_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("src");

    let violations: Vec<Violation> = WalkDir::new(&src_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .filter(|e| !is_allowed(&e.path().display().to_string()))
        .flat_map(|e| check_file(e.path()))
        .collect();

    if violations.is_empty() {
        return;
    }

    let mut report = String::from(
        "\n\nDiscarded results on the sync or motor path:\n\
         Log the failure, return it with `?`, or map it to a domain error.\n\n",
    );
    for v in &violations {
        let what = GUARDED
            .iter()
            .find(|(name, _)| *name == v.method)
            .map_or("", |(_, what)| *what);
        report.push_str(&format!(
            "  - {}: {} ({}) discarded via {:?}\n",
            v.file, v.method, what, v.how
        ));
    }
    panic!("{}", report);
}

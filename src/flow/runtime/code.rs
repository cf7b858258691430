// SPDX-License-Identifier: MIT

//! Code runner: user JavaScript in a boa_engine sandbox
//!
//! The body of a code node becomes an async function of `input`,
//! `attachments` and `context`, so a bare `return` works and returned
//! promises are awaited. Before it runs, the global object is cut down to an
//! allow-list and the capabilities a workflow step must not have are
//! replaced by stubs that throw.
//!
//! Evaluation happens on a dedicated thread. The caller waits at most the
//! configured timeout; loop and recursion limits stop most runaway scripts
//! on that thread eventually.

use super::ExecutionError;
use boa_engine::job::SimpleJobQueue;
use boa_engine::{Context, Source};
use serde::Deserialize;
use serde_json::Value;
use std::rc::Rc;
use std::time::Duration;

const LOOP_ITERATION_LIMIT: u64 = 1_000_000;
const RECURSION_LIMIT: usize = 512;

/// Globals left in place; everything else is deleted
const ALLOWED_GLOBALS: &[&str] = &[
    "globalThis",
    "undefined",
    "NaN",
    "Infinity",
    "Object",
    "Array",
    "String",
    "Number",
    "Boolean",
    "Symbol",
    "BigInt",
    "Error",
    "TypeError",
    "RangeError",
    "SyntaxError",
    "ReferenceError",
    "EvalError",
    "URIError",
    "AggregateError",
    "JSON",
    "Math",
    "Date",
    "RegExp",
    "Map",
    "Set",
    "WeakMap",
    "WeakSet",
    "Promise",
    "parseInt",
    "parseFloat",
    "isNaN",
    "isFinite",
    "encodeURI",
    "encodeURIComponent",
    "decodeURI",
    "decodeURIComponent",
];

/// Capabilities replaced by throwing stubs
const DENIED_GLOBALS: &[&str] = &[
    "fetch",
    "setTimeout",
    "setInterval",
    "setImmediate",
    "XMLHttpRequest",
    "require",
    "eval",
    "Function",
];

/// Values visible to the script
#[derive(Debug, Clone, Default)]
pub struct CodeBindings {
    pub input: Value,
    pub attachments: Value,
    pub context: Value,
}

/// One captured `console.*` call
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ConsoleLine {
    pub level: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct Settled {
    done: bool,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    logs: Vec<ConsoleLine>,
}

/// A JSON document as a single-quoted JavaScript string literal
fn js_string_literal(json: &str) -> String {
    let mut literal = String::with_capacity(json.len() + 2);
    literal.push('\'');
    for c in json.chars() {
        match c {
            '\\' => literal.push_str("\\\\"),
            '\'' => literal.push_str("\\'"),
            '\u{2028}' => literal.push_str("\\u2028"),
            '\u{2029}' => literal.push_str("\\u2029"),
            c => literal.push(c),
        }
    }
    literal.push('\'');
    literal
}

fn quoted_list(names: &[&str]) -> String {
    names
        .iter()
        .map(|name| format!("\"{}\"", name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn prelude(bindings: &CodeBindings) -> Result<String, serde_json::Error> {
    let input = js_string_literal(&serde_json::to_string(&bindings.input)?);
    let attachments = js_string_literal(&serde_json::to_string(&bindings.attachments)?);
    let context = js_string_literal(&serde_json::to_string(&bindings.context)?);

    Ok(format!(
        r#"
(function () {{
    var allowed = [{allowed}];
    Object.getOwnPropertyNames(globalThis).forEach(function (key) {{
        if (allowed.indexOf(key) === -1) {{
            try {{ delete globalThis[key]; }} catch (e) {{ globalThis[key] = undefined; }}
        }}
    }});
    [{denied}].forEach(function (name) {{
        globalThis[name] = function () {{
            throw new Error(name + " is not available in code nodes");
        }};
    }});
}})();
var __console_logs = [];
var console = (function () {{
    function capture(level) {{
        return function () {{
            var parts = [];
            for (var i = 0; i < arguments.length; i++) {{
                var arg = arguments[i];
                parts.push(typeof arg === "object" && arg !== null ? JSON.stringify(arg) : String(arg));
            }}
            __console_logs.push({{ level: level, text: parts.join(" ") }});
        }};
    }}
    return {{
        log: capture("log"),
        info: capture("info"),
        debug: capture("debug"),
        warn: capture("warn"),
        error: capture("error")
    }};
}})();
var __input = JSON.parse({input});
var __attachments = JSON.parse({attachments});
var __context = JSON.parse({context});
var __result = {{ done: false }};
function __describe(e) {{
    if (e !== null && typeof e === "object" && "message" in e) {{
        return (e.name ? e.name + ": " : "") + e.message;
    }}
    return String(e);
}}
"#,
        allowed = quoted_list(ALLOWED_GLOBALS),
        denied = quoted_list(DENIED_GLOBALS),
    ))
}

fn wrap(code: &str) -> String {
    format!(
        r#"
(async function (input, attachments, context) {{
{code}
}})(__input, __attachments, __context).then(
    function (value) {{ __result = {{ done: true, value: value === undefined ? null : value }}; }},
    function (error) {{ __result = {{ done: true, error: __describe(error) }}; }}
);
"#
    )
}

const READBACK: &str = r#"JSON.stringify({
    done: __result.done,
    value: __result.value === undefined ? null : __result.value,
    error: __result.error,
    logs: __console_logs
})"#;

/// Evaluate on the current thread; returns the settled value and captured logs
fn evaluate(code: &str, bindings: &CodeBindings) -> Result<(Value, Vec<ConsoleLine>), String> {
    let mut context = Context::builder()
        .job_queue(Rc::new(SimpleJobQueue::new()))
        .build()
        .map_err(|e| format!("cannot create script context: {}", e))?;
    context.runtime_limits_mut().set_loop_iteration_limit(LOOP_ITERATION_LIMIT);
    context.runtime_limits_mut().set_recursion_limit(RECURSION_LIMIT);

    let prelude = prelude(bindings).map_err(|e| format!("cannot serialise bindings: {}", e))?;
    context
        .eval(Source::from_bytes(prelude.as_bytes()))
        .map_err(|e| format!("sandbox setup failed: {}", e))?;

    context
        .eval(Source::from_bytes(wrap(code).as_bytes()))
        .map_err(|e| e.to_string())?;
    context.run_jobs();

    let settled = context
        .eval(Source::from_bytes(READBACK))
        .map_err(|e| format!("cannot read the result: {}", e))?;
    let text = settled
        .as_string()
        .map(|s| s.to_std_string_escaped())
        .ok_or_else(|| "cannot read the result".to_string())?;
    let settled: Settled = serde_json::from_str(&text).map_err(|e| e.to_string())?;

    if let Some(error) = settled.error {
        return Err(error);
    }
    if !settled.done {
        return Err("the returned promise never settled".to_string());
    }
    Ok((settled.value, settled.logs))
}

/// Run a code node's body
pub async fn run_code(
    node_id: &str,
    code: &str,
    bindings: CodeBindings,
    timeout: Duration,
) -> Result<Value, ExecutionError> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let source = code.to_string();

    std::thread::Builder::new()
        .name(format!("code-{}", node_id))
        .spawn(move || {
            let _ = tx.send(evaluate(&source, &bindings));
        })
        .map_err(|e| ExecutionError::Script {
            node_id: node_id.to_string(),
            message: format!("cannot start the script thread: {}", e),
        })?;

    let outcome = match tokio::time::timeout(timeout, rx).await {
        Err(_) => {
            log::warn!("[{}] Script exceeded {} ms", node_id, timeout.as_millis());
            return Err(ExecutionError::Timeout {
                node_id: node_id.to_string(),
                millis: timeout.as_millis(),
            });
        }
        Ok(Err(_)) => Err("the script thread stopped without a result".to_string()),
        Ok(Ok(outcome)) => outcome,
    };

    match outcome {
        Ok((value, logs)) => {
            for line in logs {
                match line.level.as_str() {
                    "error" => log::error!("[{}] console.error: {}", node_id, line.text),
                    "warn" => log::warn!("[{}] console.warn: {}", node_id, line.text),
                    "debug" => log::debug!("[{}] console.debug: {}", node_id, line.text),
                    level => log::info!("[{}] console.{}: {}", node_id, level, line.text),
                }
            }
            Ok(value)
        }
        Err(message) => Err(ExecutionError::Script {
            node_id: node_id.to_string(),
            message,
        }),
    }
}

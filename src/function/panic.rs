//! Turning handler panics into error documents.
//!
//! The stack is gone by the time `catch_unwind` returns, so a process-wide
//! panic hook captures the backtrace on the panicking thread and parks it in
//! a thread local. The catching side runs on the same thread within the same
//! poll and takes it back out.

use crate::error::{InvocationError, StackFrame};
use futures::FutureExt;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Once;

struct CapturedPanic {
    location: Option<StackFrame>,
    backtrace: String,
}

thread_local! {
    static LAST_PANIC: RefCell<Option<CapturedPanic>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

fn install_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let location = info.location().map(|loc| StackFrame {
                path: normalize_path(loc.file()),
                line: loc.line(),
                label: "panic".to_string(),
            });
            let backtrace = Backtrace::force_capture().to_string();
            LAST_PANIC.with(|slot| {
                *slot.borrow_mut() = Some(CapturedPanic {
                    location,
                    backtrace,
                })
            });
            previous(info);
        }));
    });
}

/// Drive `fut`, converting a panic into an [`InvocationError`] with
/// `should_exit` set.
pub(crate) async fn catch_panic<F: Future>(fut: F) -> Result<F::Output, InvocationError> {
    install_hook();
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(output) => Ok(output),
        Err(payload) => Err(panic_error(payload)),
    }
}

fn panic_error(payload: Box<dyn Any + Send>) -> InvocationError {
    let (error_type, message) = if let Some(s) = payload.downcast_ref::<&str>() {
        ("&str", s.to_string())
    } else if let Some(s) = payload.downcast_ref::<String>() {
        ("String", s.clone())
    } else {
        ("Box<dyn Any + Send>", "unknown panic".to_string())
    };

    let captured = LAST_PANIC.with(|slot| slot.borrow_mut().take());
    let mut frames = captured
        .as_ref()
        .map(|c| parse_backtrace(&c.backtrace))
        .unwrap_or_default();
    if frames.is_empty() {
        frames.push(
            captured
                .and_then(|c| c.location)
                .unwrap_or_else(|| StackFrame {
                    path: String::new(),
                    line: 0,
                    label: "panic".to_string(),
                }),
        );
    }

    InvocationError::new(error_type, message)
        .with_stack_trace(frames)
        .exit()
}

/// Parse the `Display` output of [`Backtrace`] into user frames.
///
/// Panic machinery at the top of the stack is skipped, and collection stops
/// at the `catch_unwind` boundary so executor frames are not reported.
pub(crate) fn parse_backtrace(raw: &str) -> Vec<StackFrame> {
    let mut symbols: Vec<(String, Option<(String, u32)>)> = Vec::new();
    for line in raw.lines() {
        let line = line.trim();
        if let Some(location) = line.strip_prefix("at ") {
            if let Some(last) = symbols.last_mut() {
                last.1 = parse_location(location);
            }
            continue;
        }
        let symbol = match line.split_once(": ") {
            Some((index, symbol)) if index.chars().all(|c| c.is_ascii_digit()) => symbol,
            _ => line,
        };
        if !symbol.is_empty() {
            symbols.push((symbol.to_string(), None));
        }
    }

    symbols
        .into_iter()
        .skip_while(|(symbol, _)| is_runtime_frame(symbol))
        .take_while(|(symbol, _)| !is_catch_boundary(symbol))
        .filter(|(symbol, _)| !is_runtime_frame(symbol))
        .map(|(symbol, location)| {
            let (path, line) = location.unwrap_or_default();
            StackFrame {
                path,
                line,
                label: frame_label(&symbol),
            }
        })
        .collect()
}

fn parse_location(location: &str) -> Option<(String, u32)> {
    let mut parts = location.rsplitn(3, ':');
    let _column = parts.next()?;
    let line = parts.next()?.parse().ok()?;
    let file = parts.next()?;
    Some((normalize_path(file), line))
}

fn is_runtime_frame(symbol: &str) -> bool {
    const PREFIXES: &[&str] = &[
        "std::",
        "core::",
        "alloc::",
        "<std::",
        "<core::",
        "<alloc::",
        "rust_begin_unwind",
        "__rust",
        "lambda_rt::function::panic::install_hook",
    ];
    PREFIXES.iter().any(|prefix| symbol.starts_with(prefix))
}

fn is_catch_boundary(symbol: &str) -> bool {
    symbol.contains("catch_unwind") || symbol.starts_with("std::panicking::try")
}

/// Keep the path from the package directory down: everything before the
/// component that precedes the last `/src/` is dropped.
pub(crate) fn normalize_path(path: &str) -> String {
    let path = path.trim_start_matches("./");
    match path.rfind("/src/") {
        Some(idx) => {
            let package_start = path[..idx].rfind('/').map_or(0, |i| i + 1);
            path[package_start..].to_string()
        }
        None => path.to_string(),
    }
}

/// Last path segment of a symbol, ignoring closure and generic suffixes.
pub(crate) fn frame_label(symbol: &str) -> String {
    symbol
        .split("::")
        .filter(|segment| {
            !segment.is_empty() && !segment.starts_with('{') && !segment.starts_with('<')
        })
        .last()
        .unwrap_or(symbol)
        .trim_end_matches('>')
        .to_string()
}

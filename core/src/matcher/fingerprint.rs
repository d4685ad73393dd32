//! Canonical cache keys for a context's local values.
//!
//! The fingerprint is `k1=v1;k2=v2;...` over the context's *local* map (the
//! parent is ignored), with keys sorted by their encoded form so insertion
//! order never matters.
//!
//! # INV: Injective
//!
//! Distinct local maps never share a fingerprint, so a cache hit is always
//! the answer an uncached walk would give.
//!
//! - Strings (keys and values) are written verbatim with `\`, `;`, `=` and
//!   `:` escaped by a backslash.
//! - Every other type carries a one-letter tag: `i:-3`, `u:3`, `b:true`,
//!   `f:1.5`, `d:<nanos>`, `t:<rfc3339>`, `x:<hex>`, `c:<address>`, and
//!   for keys `k:<char>`.
//!
//! Since strings escape `:`, a tagged value can never be mistaken for a
//! string, and since they escape `;` and `=` an entry boundary can never be
//! forged from inside a value.
//!
//! Builders come from a process-wide pool of pre-grown `String`s.

use crate::{Context, Key, Value};
use parking_lot::Mutex;
use std::fmt::Write;
use std::sync::Arc;

const BUILDER_CAPACITY: usize = 128;
const MAX_POOLED: usize = 64;

static BUILDERS: Mutex<Vec<String>> = parking_lot::const_mutex(Vec::new());

/// Compute the cache fingerprint of `ctx`'s local values.
///
/// ```
/// use ruleq::{fingerprint, Context};
///
/// let a = Context::new();
/// a.with_value("b", 2i64).with_value("a", "x");
/// let b = Context::new();
/// b.with_value("a", "x").with_value("b", 2i64);
///
/// assert_eq!(fingerprint(&a), "a=x;b=i:2");
/// assert_eq!(fingerprint(&a), fingerprint(&b));
/// ```
#[must_use]
pub fn fingerprint(ctx: &Context) -> String {
    let mut buf = take_builder();
    ctx.with_local_values(|values| {
        if values.len() == 1 {
            if let Some((key, value)) = values.iter().next() {
                if value.is_primitive() {
                    push_key(&mut buf, key);
                    buf.push('=');
                    push_value(&mut buf, value);
                    return;
                }
            }
        }

        let mut entries: Vec<(String, &Value)> = values
            .iter()
            .map(|(k, v)| (key_string(k), v))
            .collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        for (i, (key, value)) in entries.iter().enumerate() {
            if i > 0 {
                buf.push(';');
            }
            buf.push_str(key);
            buf.push('=');
            push_value(&mut buf, value);
        }
    });
    let out = String::from(buf.as_str());
    give_builder(buf);
    out
}

fn take_builder() -> String {
    BUILDERS
        .lock()
        .pop()
        .unwrap_or_else(|| String::with_capacity(BUILDER_CAPACITY))
}

fn give_builder(mut buf: String) {
    buf.clear();
    let mut pool = BUILDERS.lock();
    if pool.len() < MAX_POOLED {
        pool.push(buf);
    }
}

fn key_string(key: &Key) -> String {
    let mut s = String::new();
    push_key(&mut s, key);
    s
}

fn push_key(buf: &mut String, key: &Key) {
    match key {
        Key::Str(s) => push_escaped(buf, s),
        Key::Int(n) => {
            buf.push_str("i:");
            push_i64(buf, *n);
        }
        Key::Uint(n) => {
            buf.push_str("u:");
            push_u64(buf, *n);
        }
        Key::Bool(b) => push_bool(buf, *b),
        Key::Char(c) => {
            buf.push_str("k:");
            push_escaped(buf, c.encode_utf8(&mut [0u8; 4]));
        }
    }
}

fn push_value(buf: &mut String, value: &Value) {
    match value {
        Value::Str(s) => push_escaped(buf, s),
        Value::Int(n) => {
            buf.push_str("i:");
            push_i64(buf, *n);
        }
        Value::Uint(n) => {
            buf.push_str("u:");
            push_u64(buf, *n);
        }
        Value::Bool(b) => push_bool(buf, *b),
        Value::Float(x) => {
            let _ = write!(buf, "f:{x:?}");
        }
        Value::Duration(d) => {
            buf.push_str("d:");
            let nanos = d.as_nanos();
            let _ = write!(buf, "{nanos}");
        }
        Value::Time(t) => {
            buf.push_str("t:");
            push_escaped(buf, &t.to_rfc3339());
        }
        Value::Bytes(bytes) => {
            buf.push_str("x:");
            for b in bytes {
                let _ = write!(buf, "{b:02x}");
            }
        }
        Value::Custom(c) => {
            let _ = write!(buf, "c:{:p}", Arc::as_ptr(c));
        }
    }
}

fn push_bool(buf: &mut String, b: bool) {
    buf.push_str(if b { "b:true" } else { "b:false" });
}

fn push_escaped(buf: &mut String, s: &str) {
    if !s.contains(['\\', ';', '=', ':']) {
        buf.push_str(s);
        return;
    }
    for c in s.chars() {
        if matches!(c, '\\' | ';' | '=' | ':') {
            buf.push('\\');
        }
        buf.push(c);
    }
}

fn push_i64(buf: &mut String, n: i64) {
    if n < 0 {
        buf.push('-');
    }
    push_u64(buf, n.unsigned_abs());
}

fn push_u64(buf: &mut String, mut n: u64) {
    let mut digits = [0u8; 20];
    let mut i = digits.len();
    loop {
        i -= 1;
        // n % 10 < 10, so the cast is lossless.
        digits[i] = b'0' + (n % 10) as u8;
        n /= 10;
        if n == 0 {
            break;
        }
    }
    for &d in &digits[i..] {
        buf.push(char::from(d));
    }
}

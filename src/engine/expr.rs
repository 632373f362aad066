//! Tiny predicate, transform and key expressions for the CLI (`gt:3`, `mul:2`, `mod:4`, ...).

use anyhow::{Context, Result, anyhow, bail};
use std::str::FromStr;

fn arg_i64(expr: &str, raw: &str) -> Result<i64> {
    raw.trim()
        .parse()
        .with_context(|| format!("{}: expected an integer, got {:?}", expr, raw))
}

fn split_expr(s: &str) -> (&str, Vec<&str>) {
    let mut parts = s.trim().split(':');
    let name = parts.next().unwrap_or_default();
    (name, parts.collect())
}

/// Euclidean remainder. `k` is non-zero (checked at parse time), so the only overflow is
/// `i64::MIN` mod `-1`, whose remainder is 0.
fn euclid_rem(x: i64, k: i64) -> i64 {
    x.checked_rem_euclid(k).unwrap_or(0)
}

/// Element predicate. `FailOn(n)` errors when it meets `n`, to exercise failure handling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pred {
    Even,
    Odd,
    Gt(i64),
    Lt(i64),
    Eq(i64),
    /// `x mod k == r` (euclidean remainder).
    Mod(i64, i64),
    FailOn(i64),
}

impl Pred {
    pub fn eval(self, x: i64) -> Result<bool> {
        Ok(match self {
            Pred::Even => x % 2 == 0,
            Pred::Odd => x % 2 != 0,
            Pred::Gt(n) => x > n,
            Pred::Lt(n) => x < n,
            Pred::Eq(n) => x == n,
            Pred::Mod(k, r) => euclid_rem(x, k) == r,
            Pred::FailOn(n) => {
                if x == n {
                    bail!("predicate fail-on:{} hit {}", n, x);
                }
                true
            }
        })
    }
}

impl FromStr for Pred {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (name, args) = split_expr(s);
        let pred = match (name, args.as_slice()) {
            ("even", []) => Pred::Even,
            ("odd", []) => Pred::Odd,
            ("gt", [n]) => Pred::Gt(arg_i64(s, n)?),
            ("lt", [n]) => Pred::Lt(arg_i64(s, n)?),
            ("eq", [n]) => Pred::Eq(arg_i64(s, n)?),
            ("mod", [k, r]) => {
                let k = arg_i64(s, k)?;
                if k == 0 {
                    bail!("{}: modulus must be non-zero", s);
                }
                Pred::Mod(k, arg_i64(s, r)?)
            }
            ("fail-on", [n]) => Pred::FailOn(arg_i64(s, n)?),
            _ => bail!(
                "unknown predicate {:?} (even, odd, gt:N, lt:N, eq:N, mod:K:R, fail-on:N)",
                s
            ),
        };
        Ok(pred)
    }
}

/// Per-element transform. `Repeat` is a flat-map; the rest map one value to one value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transform {
    Square,
    Neg,
    Add(i64),
    Mul(i64),
    /// `n / x`; fails when `x` is zero.
    Div(i64),
    Repeat(usize),
}

impl Transform {
    /// One-to-one transforms. Overflow and division by zero are errors.
    pub fn apply(self, x: i64) -> Result<i64> {
        let overflow = || anyhow!("{:?} overflows on {}", self, x);
        match self {
            Transform::Square => x.checked_mul(x).ok_or_else(overflow),
            Transform::Neg => x.checked_neg().ok_or_else(overflow),
            Transform::Add(n) => x.checked_add(n).ok_or_else(overflow),
            Transform::Mul(n) => x.checked_mul(n).ok_or_else(overflow),
            Transform::Div(n) => {
                if x == 0 {
                    bail!("division by zero: {} / {}", n, x);
                }
                n.checked_div(x).ok_or_else(overflow)
            }
            Transform::Repeat(_) => Ok(x),
        }
    }
}

impl FromStr for Transform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (name, args) = split_expr(s);
        let t = match (name, args.as_slice()) {
            ("square", []) => Transform::Square,
            ("neg", []) => Transform::Neg,
            ("add", [n]) => Transform::Add(arg_i64(s, n)?),
            ("mul", [n]) => Transform::Mul(arg_i64(s, n)?),
            ("div", [n]) => Transform::Div(arg_i64(s, n)?),
            ("repeat", [n]) => Transform::Repeat(
                n.trim()
                    .parse()
                    .with_context(|| format!("{}: expected a count", s))?,
            ),
            _ => bail!(
                "unknown transform {:?} (square, neg, add:N, mul:N, div:N, repeat:N)",
                s
            ),
        };
        Ok(t)
    }
}

/// Grouping key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyFn {
    /// Euclidean remainder modulo `k`.
    Mod(i64),
    Sign,
}

impl KeyFn {
    pub fn key(self, x: i64) -> String {
        match self {
            KeyFn::Mod(k) => format!("mod{}={}", k, euclid_rem(x, k)),
            KeyFn::Sign => match x.signum() {
                -1 => "negative",
                0 => "zero",
                _ => "positive",
            }
            .to_string(),
        }
    }

    /// Parse a comma-separated list of keys (`mod:2,sign`).
    pub fn parse_list(s: &str) -> Result<Vec<KeyFn>> {
        s.split(',').map(str::parse).collect()
    }
}

impl FromStr for KeyFn {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (name, args) = split_expr(s);
        match (name, args.as_slice()) {
            ("sign", []) => Ok(KeyFn::Sign),
            ("mod", [k]) => match arg_i64(s, k)? {
                0 => bail!("{}: modulus must be non-zero", s),
                k => Ok(KeyFn::Mod(k)),
            },
            _ => bail!("unknown key {:?} (mod:K, sign)", s),
        }
    }
}

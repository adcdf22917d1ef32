//! The canonical order: numeric when every token is a decimal number,
//! lexicographic otherwise. Numbers compare exactly, with no float rounding.

use std::{cmp::Ordering, str::FromStr};

use num_bigint::{BigInt, BigUint, Sign};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalOrder {
  Numeric,
  Lexicographic,
}

impl CanonicalOrder {
  pub fn detect<S: AsRef<str>>(tokens: &[S]) -> Self {
    if tokens.iter().all(|t| t.as_ref().parse::<Decimal>().is_ok()) {
      CanonicalOrder::Numeric
    } else {
      CanonicalOrder::Lexicographic
    }
  }
}

/// `mantissa * 10^exponent`, with trailing zeros folded into the exponent so
/// that equal values are structurally equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decimal {
  mantissa: BigInt,
  exponent: i64,
  /// Decimal digits in `mantissa`.
  digits: i64,
}

/// Exponents beyond this are rejected rather than risk overflow.
const MAX_EXPONENT: i64 = 1 << 48;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotADecimal;

impl FromStr for Decimal {
  type Err = NotADecimal;

  fn from_str(token: &str) -> Result<Self, Self::Err> {
    let (negative, rest) = match token.as_bytes().first() {
      Some(b'-') => (true, &token[1..]),
      Some(b'+') => (false, &token[1..]),
      Some(_) => (false, token),
      None => return Err(NotADecimal),
    };

    let (number, exponent) = match rest.find(['e', 'E']) {
      Some(i) => (&rest[..i], rest[i + 1..].parse::<i64>().map_err(|_| NotADecimal)?),
      None => (rest, 0),
    };
    if exponent.abs() > MAX_EXPONENT {
      return Err(NotADecimal);
    }

    let (int, frac) = number.split_once('.').unwrap_or((number, ""));
    if int.is_empty() && frac.is_empty() {
      return Err(NotADecimal);
    }
    if !int.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
      return Err(NotADecimal);
    }

    let magnitude: BigUint = format!("{int}{frac}").parse().map_err(|_| NotADecimal)?;
    let sign = if negative { Sign::Minus } else { Sign::Plus };

    Ok(Decimal::normalized(BigInt::from_biguint(sign, magnitude), exponent - frac.len() as i64))
  }
}

impl Decimal {
  fn normalized(mut mantissa: BigInt, mut exponent: i64) -> Self {
    if mantissa.sign() == Sign::NoSign {
      return Self {
        mantissa,
        exponent: 0,
        digits: 1,
      };
    }

    let ten = BigInt::from(10);
    while (&mantissa % &ten).sign() == Sign::NoSign {
      mantissa /= &ten;
      exponent += 1;
    }

    let digits = mantissa.magnitude().to_string().len() as i64;

    Self {
      mantissa,
      exponent,
      digits,
    }
  }

  /// Position of the most significant digit.
  fn scale(&self) -> i64 {
    self.digits + self.exponent
  }

  fn cmp_magnitude(&self, other: &Self) -> Ordering {
    let by_scale = self.scale().cmp(&other.scale());
    if by_scale != Ordering::Equal {
      return by_scale;
    }

    // Same scale bounds the exponent gap by the digit count.
    let (a, b) = (self.mantissa.magnitude(), other.mantissa.magnitude());
    let shift = |n: i64| BigUint::from(10u32).pow(n as u32);

    match self.exponent.cmp(&other.exponent) {
      Ordering::Greater => (a * shift(self.exponent - other.exponent)).cmp(b),
      Ordering::Less => a.cmp(&(b * shift(other.exponent - self.exponent))),
      Ordering::Equal => a.cmp(b),
    }
  }
}

fn sign_rank(sign: Sign) -> u8 {
  match sign {
    Sign::Minus => 0,
    Sign::NoSign => 1,
    Sign::Plus => 2,
  }
}

impl Ord for Decimal {
  fn cmp(&self, other: &Self) -> Ordering {
    let (a, b) = (self.mantissa.sign(), other.mantissa.sign());
    if a != b {
      return sign_rank(a).cmp(&sign_rank(b));
    }

    match a {
      Sign::NoSign => Ordering::Equal,
      Sign::Plus => self.cmp_magnitude(other),
      Sign::Minus => self.cmp_magnitude(other).reverse(),
    }
  }
}

impl PartialOrd for Decimal {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

/// Sorts `tokens` into canonical order. Numerically equal tokens with
/// different spellings are ordered by their bytes.
pub fn canonical_sort(mut tokens: Vec<String>) -> Vec<String> {
  let keys: Result<Vec<Decimal>, _> = tokens.iter().map(|t| t.parse()).collect();

  match keys {
    Ok(keys) => {
      let mut keyed: Vec<_> = keys.into_iter().zip(tokens).collect();
      keyed.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
      keyed.into_iter().map(|(_, token)| token).collect()
    }
    Err(_) => {
      tokens.sort();
      tokens
    }
  }
}

/// Orders each run of adjacent, numerically equal lines by their bytes, the
/// way [`canonical_sort`] breaks ties. Any non-decreasing arrangement of the
/// same values then reads the same. Lines that are not decimals stay put.
pub fn settle_ties(lines: &mut [Vec<u8>]) {
  let keys: Vec<Option<Decimal>> = lines
    .iter()
    .map(|line| std::str::from_utf8(line).ok().and_then(|line| line.parse().ok()))
    .collect();

  let mut start = 0;
  while start < lines.len() {
    let mut end = start + 1;
    if keys[start].is_some() {
      while end < lines.len() && keys[end] == keys[start] {
        end += 1;
      }
    }

    lines[start..end].sort();
    start = end;
  }
}

//! Human-readable byte sizes, e.g. `"1.5 MiB"` or `"1,023 B"`.

/// Unit family for [`format_bytes`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Base {
    /// Powers of 1024: KiB, MiB, ...
    #[default]
    Two,
    /// Powers of 1000: KB, MB, ...
    Ten,
}

impl Base {
    /// Maps `2` or `10` to a base.
    #[must_use]
    pub fn from_radix(radix: u32) -> Option<Self> {
        match radix {
            2 => Some(Self::Two),
            10 => Some(Self::Ten),
            _ => None,
        }
    }

    fn step(self) -> u64 {
        match self {
            Self::Two => 1024,
            Self::Ten => 1000,
        }
    }

    fn units(self) -> &'static [&'static str] {
        match self {
            Self::Two => &["B", "KiB", "MiB", "GiB", "TiB", "PiB"],
            Self::Ten => &["B", "KB", "MB", "GB", "TB", "PB"],
        }
    }
}

/// Formats `value` in the largest unit not exceeding it, with up to two
/// fraction digits and comma thousands separators.
#[must_use]
pub fn format_bytes(value: u64, base: Base) -> String {
    let units = base.units();
    let step = base.step();

    let mut exp = 0;
    let mut scale = 1u64;
    while exp + 1 < units.len() && value / scale >= step {
        scale *= step;
        exp += 1;
    }

    format!("{} {}", format_decimal(value as f64 / scale as f64), units[exp])
}

fn format_decimal(value: f64) -> String {
    let fixed = format!("{value:.2}");
    let (int, frac) = fixed.split_once('.').unwrap_or((&fixed, ""));
    let frac = frac.trim_end_matches('0');

    let mut grouped = String::with_capacity(int.len() + int.len() / 3);
    for (i, digit) in int.chars().enumerate() {
        if i > 0 && (int.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    if frac.is_empty() {
        grouped
    } else {
        format!("{grouped}.{frac}")
    }
}

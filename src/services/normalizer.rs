//! GPU name normalization service
//!
//! Maps free-text marketplace GPU names onto one canonical model identifier
//! so offers from different vendors can be compared.
//!
//! Names are matched against an ordered rule table. The first matching rule
//! wins, so a more specific name ("L40S", "RTX 3090 Ti") must be listed
//! before the broader one that shares its prefix ("L40", "RTX 3090").
//! Names no rule covers fall back to `<VENDOR> <UPPERCASED NAME>`.

use crate::types::GpuModel;
use once_cell::sync::Lazy;
use regex::Regex;

/// (token pattern, canonical name), most specific first.
///
/// A space in a pattern matches any run of spaces, hyphens or underscores.
const RULES: &[(&str, &str)] = &[
    // NVIDIA datacenter
    ("gb200", "NVIDIA GB200"),
    ("b200", "NVIDIA B200"),
    ("gh200", "NVIDIA GH200"),
    ("h200", "NVIDIA H200"),
    ("h100", "NVIDIA H100"),
    ("h800", "NVIDIA H800"),
    ("a100", "NVIDIA A100"),
    ("a800", "NVIDIA A800"),
    ("l40s", "NVIDIA L40S"),
    ("l40", "NVIDIA L40"),
    ("l4", "NVIDIA L4"),
    ("a40", "NVIDIA A40"),
    ("a30", "NVIDIA A30"),
    ("a10g", "NVIDIA A10G"),
    ("a10", "NVIDIA A10"),
    ("a16", "NVIDIA A16"),
    ("v100", "NVIDIA V100"),
    ("p100", "NVIDIA P100"),
    ("t4", "NVIDIA T4"),
    // NVIDIA workstation
    ("rtx 6000 ada", "NVIDIA RTX 6000 Ada"),
    ("rtx 5000 ada", "NVIDIA RTX 5000 Ada"),
    ("rtx 4000 (?:sff )?ada", "NVIDIA RTX 4000 Ada"),
    ("(?:rtx )?a6000", "NVIDIA RTX A6000"),
    ("(?:rtx )?a5000", "NVIDIA RTX A5000"),
    ("(?:rtx )?a4500", "NVIDIA RTX A4500"),
    ("(?:rtx )?a4000", "NVIDIA RTX A4000"),
    ("(?:quadro )?rtx 8000", "NVIDIA Quadro RTX 8000"),
    // NVIDIA GeForce
    ("(?:rtx )?5090", "NVIDIA RTX 5090"),
    ("(?:rtx )?5080", "NVIDIA RTX 5080"),
    ("(?:rtx )?4090", "NVIDIA RTX 4090"),
    ("(?:rtx )?4080", "NVIDIA RTX 4080"),
    ("(?:rtx )?4070 ti", "NVIDIA RTX 4070 Ti"),
    ("(?:rtx )?4070", "NVIDIA RTX 4070"),
    ("(?:rtx )?3090 ti", "NVIDIA RTX 3090 Ti"),
    ("(?:rtx )?3090", "NVIDIA RTX 3090"),
    ("(?:rtx )?3080 ti", "NVIDIA RTX 3080 Ti"),
    ("(?:rtx )?3080", "NVIDIA RTX 3080"),
    ("(?:rtx )?3070", "NVIDIA RTX 3070"),
    // AMD
    ("mi300x", "AMD MI300X"),
    ("mi250x", "AMD MI250X"),
    ("mi250", "AMD MI250"),
    ("mi210", "AMD MI210"),
    ("mi100", "AMD MI100"),
    ("(?:radeon )?rx 7900 xtx", "AMD RX 7900 XTX"),
];

/// Words that name a vendor or product line rather than a model
const VENDOR_WORDS: &[&str] = &["nvidia", "geforce", "tesla", "amd", "radeon", "instinct"];

const AMD_MARKERS: &[&str] = &["amd", "radeon", "instinct"];

/// Vendor word, or an Instinct part number like "mi325x"
fn is_amd_marker(token: &str) -> bool {
    AMD_MARKERS.contains(&token)
        || token
            .strip_prefix("mi")
            .is_some_and(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
}

static RULE_TABLE: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    RULES
        .iter()
        .map(|(pattern, canonical)| {
            let body = pattern.replace(' ', r"[\s_-]*");
            // Only a trailing digit ends a match early, so "H100SXM" still hits "h100"
            let re = Regex::new(&format!(r"(?i)(?:^|[^a-z0-9]){}(?:$|[^0-9])", body))
                .expect("valid rule pattern");
            (re, *canonical)
        })
        .collect()
});

/// Normalize a raw marketplace GPU name to its canonical model.
///
/// Never fails and never returns an empty name.
///
/// # Examples
/// ```
/// use gpuscout::services::normalizer::normalize_gpu_name;
///
/// assert_eq!(normalize_gpu_name("H100 80GB PCIe").as_str(), "NVIDIA H100");
/// assert_eq!(normalize_gpu_name("nvidia-h100-sxm").as_str(), "NVIDIA H100");
/// assert_eq!(normalize_gpu_name("L40S").as_str(), "NVIDIA L40S");
/// ```
pub fn normalize_gpu_name(raw: &str) -> GpuModel {
    match match_rule(raw) {
        Some(canonical) => GpuModel::new(canonical),
        None => fallback_name(raw),
    }
}

/// Whether `raw` is covered by the rule table (as opposed to the fallback)
pub fn is_known_gpu(raw: &str) -> bool {
    match_rule(raw).is_some()
}

fn match_rule(raw: &str) -> Option<&'static str> {
    RULE_TABLE
        .iter()
        .find(|(re, _)| re.is_match(raw))
        .map(|(_, canonical)| *canonical)
}

/// `<VENDOR> <NAME>` with vendor words removed and separators collapsed
fn fallback_name(raw: &str) -> GpuModel {
    let tokens: Vec<String> = raw
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_' || c == '/')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
        .collect();

    let vendor = if tokens.iter().any(|t| is_amd_marker(t)) {
        "AMD"
    } else {
        "NVIDIA"
    };

    let model: Vec<String> = tokens
        .iter()
        .filter(|t| !VENDOR_WORDS.contains(&t.as_str()))
        .map(|t| t.to_uppercase())
        .collect();

    if model.is_empty() {
        GpuModel::new(format!("{} UNKNOWN", vendor))
    } else {
        GpuModel::new(format!("{} {}", vendor, model.join(" ")))
    }
}

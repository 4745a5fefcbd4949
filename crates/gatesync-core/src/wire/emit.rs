//! Command emit: the strict tab-separated outbound dialect.
//!
//! Intermediate processing (operator tooling, log round-trips) sometimes
//! collapses tabs into spaces, which terminals reject. Every tab-requiring
//! payload therefore goes through a repair pass before it is stored on a
//! queue; BIODATA additionally gets re-emitted in its canonical field
//! order so every firmware sees the same bytes.

use std::sync::LazyLock;

use regex::Regex;

/// Object kinds whose parameter strings require tab separation.
pub const REQUIRES_TABS: &[&str] = &[
    "USERINFO", "BIODATA", "FVEIN", "USERPIC", "BIOPHOTO", "WORKCODE", "SMS", "USER_SMS",
    "IDCARD", "FINGERTMP", "FACE",
];

/// Canonical BIODATA field order on emit. `Tmp` is handled separately
/// (greedy to end-of-string).
const BIODATA_ORDER: &[&str] = &[
    "Pin", "No", "Index", "Valid", "Duress", "Type", "MajorVer", "MinorVer", "Format",
];

/// Rewrites any whitespace run preceding a `key=` as a single tab.
static KEY_BOUNDARY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+([A-Za-z_]+=)").expect("static regex is valid"));

static TMP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bTmp=(.*)$").expect("static regex is valid"));

static BIODATA_FIELD_RES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    BIODATA_ORDER
        .iter()
        .map(|name| {
            let re = Regex::new(&format!(r"\b{name}=([^\s\t]+)")).expect("static regex is valid");
            (*name, re)
        })
        .collect()
});

/// Format the wire line for a queued command.
pub fn command_line(id: &str, payload: &str) -> String {
    format!("C:{id}:{payload}")
}

/// Repair a payload's parameter separators before it is enqueued.
///
/// Payloads whose object kind is not in the requires-tabs set pass through
/// untouched. BIODATA payloads are re-emitted in canonical field order;
/// other tab-requiring kinds get the whitespace-to-tab rewrite.
pub fn repair_payload(payload: &str) -> String {
    let Some((verb, kind, params)) = split_object_kind(payload) else {
        return payload.to_string();
    };

    if params.is_empty() {
        return payload.to_string();
    }

    // Canonical reorder applies to the 10-field put form only; delete and
    // query payloads carry partial (and differently-cased) key sets that
    // named extraction would drop.
    let repaired = if kind == "BIODATA" && verb == "DATA UPDATE" {
        canonicalize_biodata(params)
    } else {
        KEY_BOUNDARY_RE.replace_all(params, "\t$1").into_owned()
    };

    format!("{verb} {kind} {repaired}")
}

/// Re-emit a BIODATA parameter string in canonical field order.
///
/// Each field is recovered by named extraction so it does not matter what
/// separators the input arrived with; present fields are joined with
/// exactly one tab. All 10 fields present yields 9 tabs.
pub fn canonicalize_biodata(params: &str) -> String {
    let mut fields: Vec<String> = BIODATA_FIELD_RES
        .iter()
        .filter_map(|(name, re)| {
            re.captures(params).map(|cap| format!("{name}={}", &cap[1]))
        })
        .collect();

    if let Some(cap) = TMP_RE.captures(params) {
        fields.push(format!("Tmp={}", &cap[1]));
    }

    fields.join("\t")
}

/// Split an outbound payload into (verb words, object kind, parameters).
///
/// The object kind is one of the first three whitespace tokens; scanning
/// stops there so parameter values can never be mistaken for one.
fn split_object_kind(payload: &str) -> Option<(&str, &str, &str)> {
    let mut offset = 0;
    for (i, token) in payload.split(' ').enumerate() {
        if i >= 3 {
            break;
        }
        if i > 0 && REQUIRES_TABS.contains(&token) {
            let verb = payload[..offset].trim_end();
            let rest = &payload[offset + token.len()..];
            let params = rest.strip_prefix(' ').unwrap_or(rest);
            return Some((verb, token, params));
        }
        offset += token.len() + 1;
    }
    None
}

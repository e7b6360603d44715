//! Device Identity Resolver.
//!
//! Given one decoded [`Record`] and the path of the file it came from, infer a
//! device key. Two signals are available:
//!
//! - **Payload candidate**: the first field (in key order, searching nested objects
//!   and the elements of nested arrays depth-first) whose lowercased name is in the
//!   identifier vocabulary and whose value is a non-empty scalar.
//! - **Folder candidate**: the nearest ancestor directory whose name matches the
//!   configured [`FolderIdPattern`] (by default 8 to 32 hex characters).
//!
//! The rules run as an ordered chain and the first rule to resolve wins:
//!
//! 1. [`FolderOverrideRule`]: a payload candidate containing a hyphen looks like a
//!    UUID (session or message id); if a folder candidate exists, it wins.
//! 2. [`PayloadFieldRule`]: otherwise the payload candidate is the key.
//! 3. [`FolderSegmentRule`]: otherwise the folder candidate is the key.
//!
//! When nothing resolves the answer is `None`, and the scanner falls back to the
//! immediate parent folder name. That tier lives in the scanner because it always
//! succeeds and is not a statement about identity.
//!
//! ```
//! use telemetry_index::identity::{IdentityResolver, IdentitySource};
//! use serde_json::json;
//! use std::path::Path;
//!
//! let resolver = IdentityResolver::default();
//! let record = json!({"deviceId": "a1b2c3d4-0000-1111-2222-333344445555"});
//! let id = resolver
//!     .resolve(record.as_object().unwrap(), Path::new("/data/0123456789abcdef/up.json"))
//!     .unwrap();
//! assert_eq!(id.key, "0123456789abcdef");
//! assert_eq!(id.source, IdentitySource::FolderOverride);
//! ```

use crate::record::{is_metadata_key, scalar_to_string, Record};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::OnceCell;
use std::fmt;
use std::path::Path;

/// Exact identifier field names (lowercased).
pub const IDENTIFIER_FIELDS: &[&str] = &[
    "dev_eui",
    "deveui",
    "devaddr",
    "dev_addr",
    "device_id",
    "deviceid",
];

/// Whether a (lowercased, trimmed) field name names a device identifier.
#[must_use]
pub fn is_identifier_field(lowered: &str) -> bool {
    IDENTIFIER_FIELDS.contains(&lowered)
        || (lowered.contains("dev")
            && (lowered.contains("eui") || lowered.contains("addr") || lowered.contains("id")))
}

/// Which rule produced a device key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    /// An identifier field in the payload.
    Payload,
    /// A hex folder segment that replaced a UUID-shaped payload identifier.
    FolderOverride,
    /// A hex folder segment, no payload identifier present.
    Folder,
    /// The immediate parent folder name (scanner fallback).
    ParentFolder,
}

impl fmt::Display for IdentitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Payload => "payload",
            Self::FolderOverride => "folder-override",
            Self::Folder => "folder",
            Self::ParentFolder => "parent-folder",
        };
        f.write_str(s)
    }
}

/// A resolved device key and the rule that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// The device key.
    pub key: String,
    /// Where it came from.
    pub source: IdentitySource,
}

impl Identity {
    fn new(key: impl Into<String>, source: IdentitySource) -> Self {
        Self {
            key: key.into(),
            source,
        }
    }
}

/// Which directory names count as device identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderIdPattern {
    /// 8 to 32 hex characters (any case).
    #[default]
    Hex8To32,
    /// Exactly 16 hex characters, the length of a LoRaWAN DevEUI.
    Eui64,
    /// A caller-supplied regular expression, matched against the whole segment
    /// name as written (anchor it yourself).
    Custom(String),
}

/// Compiled form of a [`FolderIdPattern`].
#[derive(Debug, Clone)]
enum FolderMatcher {
    Hex { min: usize, max: usize },
    Regex(Regex),
}

impl FolderMatcher {
    fn compile(pattern: &FolderIdPattern) -> Result<Self, regex::Error> {
        Ok(match pattern {
            FolderIdPattern::Hex8To32 => Self::Hex { min: 8, max: 32 },
            FolderIdPattern::Eui64 => Self::Hex { min: 16, max: 16 },
            FolderIdPattern::Custom(re) => Self::Regex(Regex::new(re)?),
        })
    }

    fn matches(&self, segment: &str) -> bool {
        match self {
            Self::Hex { min, max } => {
                (*min..=*max).contains(&segment.len())
                    && segment.bytes().all(|b| b.is_ascii_hexdigit())
            }
            Self::Regex(re) => re.is_match(segment),
        }
    }
}

/// Inputs and lazily computed candidates shared by the rules of one resolution.
pub struct ResolveContext<'a> {
    record: &'a Record,
    path: &'a Path,
    matcher: &'a FolderMatcher,
    payload: OnceCell<Option<String>>,
    folder: OnceCell<Option<String>>,
}

impl<'a> ResolveContext<'a> {
    /// The record being resolved.
    #[must_use]
    pub fn record(&self) -> &'a Record {
        self.record
    }

    /// The file the record came from.
    #[must_use]
    pub fn path(&self) -> &'a Path {
        self.path
    }

    /// First identifier-shaped payload field value, if any.
    pub fn payload_candidate(&self) -> Option<&str> {
        self.payload
            .get_or_init(|| find_payload_id(self.record))
            .as_deref()
    }

    /// Nearest ancestor directory name matching the folder pattern, if any.
    pub fn folder_candidate(&self) -> Option<&str> {
        self.folder
            .get_or_init(|| find_folder_id(self.path, self.matcher))
            .as_deref()
    }
}

/// Result of applying one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    /// The rule produced a key; the chain stops.
    Resolved(Identity),
    /// The rule does not apply; try the next one.
    Continue,
}

/// One step of the resolution chain.
pub trait IdentityRule: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Try to resolve a key from `ctx`.
    fn apply(&self, ctx: &ResolveContext<'_>) -> RuleOutcome;
}

/// A UUID-shaped payload identifier loses to a hex folder segment.
pub struct FolderOverrideRule;

impl IdentityRule for FolderOverrideRule {
    fn name(&self) -> &str {
        "folder-override"
    }

    fn apply(&self, ctx: &ResolveContext<'_>) -> RuleOutcome {
        match (ctx.payload_candidate(), ctx.folder_candidate()) {
            (Some(payload), Some(folder)) if payload.contains('-') => {
                RuleOutcome::Resolved(Identity::new(folder, IdentitySource::FolderOverride))
            }
            _ => RuleOutcome::Continue,
        }
    }
}

/// The payload identifier field.
pub struct PayloadFieldRule;

impl IdentityRule for PayloadFieldRule {
    fn name(&self) -> &str {
        "payload-field"
    }

    fn apply(&self, ctx: &ResolveContext<'_>) -> RuleOutcome {
        match ctx.payload_candidate() {
            Some(id) => RuleOutcome::Resolved(Identity::new(id, IdentitySource::Payload)),
            None => RuleOutcome::Continue,
        }
    }
}

/// A hex-looking ancestor directory.
pub struct FolderSegmentRule;

impl IdentityRule for FolderSegmentRule {
    fn name(&self) -> &str {
        "folder-segment"
    }

    fn apply(&self, ctx: &ResolveContext<'_>) -> RuleOutcome {
        match ctx.folder_candidate() {
            Some(id) => RuleOutcome::Resolved(Identity::new(id, IdentitySource::Folder)),
            None => RuleOutcome::Continue,
        }
    }
}

/// Ordered chain of [`IdentityRule`]s plus the folder pattern they share.
pub struct IdentityResolver {
    rules: Vec<Box<dyn IdentityRule>>,
    matcher: FolderMatcher,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self {
            rules: Self::default_rules(),
            matcher: FolderMatcher::Hex { min: 8, max: 32 },
        }
    }
}

impl IdentityResolver {
    /// Build the standard chain with the given folder pattern.
    ///
    /// # Errors
    /// Returns an error if a [`FolderIdPattern::Custom`] expression does not compile.
    pub fn new(pattern: &FolderIdPattern) -> Result<Self, regex::Error> {
        Ok(Self {
            rules: Self::default_rules(),
            matcher: FolderMatcher::compile(pattern)?,
        })
    }

    /// Build a resolver from an explicit rule list.
    ///
    /// # Errors
    /// Returns an error if a [`FolderIdPattern::Custom`] expression does not compile.
    pub fn with_rules(
        pattern: &FolderIdPattern,
        rules: Vec<Box<dyn IdentityRule>>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            rules,
            matcher: FolderMatcher::compile(pattern)?,
        })
    }

    fn default_rules() -> Vec<Box<dyn IdentityRule>> {
        vec![
            Box::new(FolderOverrideRule),
            Box::new(PayloadFieldRule),
            Box::new(FolderSegmentRule),
        ]
    }

    /// Names of the rules in evaluation order.
    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.name())
    }

    /// Run the chain. `None` means no rule found an identity.
    #[must_use]
    pub fn resolve(&self, record: &Record, path: &Path) -> Option<Identity> {
        let ctx = ResolveContext {
            record,
            path,
            matcher: &self.matcher,
            payload: OnceCell::new(),
            folder: OnceCell::new(),
        };
        self.rules.iter().find_map(|rule| match rule.apply(&ctx) {
            RuleOutcome::Resolved(id) => Some(id),
            RuleOutcome::Continue => None,
        })
    }
}

/// Depth-first search for the first identifier field with a usable scalar value.
#[must_use]
pub fn find_payload_id(record: &Record) -> Option<String> {
    for (k, v) in record {
        if is_metadata_key(k) {
            continue;
        }
        let lowered = k.trim().to_lowercase();
        if is_identifier_field(&lowered)
            && let Some(id) = scalar_to_string(v)
        {
            return Some(id);
        }
        if let Some(id) = find_in_value(v) {
            return Some(id);
        }
    }
    None
}

fn find_in_value(v: &Value) -> Option<String> {
    match v {
        Value::Object(obj) => find_payload_id(obj),
        Value::Array(items) => items.iter().find_map(find_in_value),
        _ => None,
    }
}

fn find_folder_id(path: &Path, matcher: &FolderMatcher) -> Option<String> {
    path.parent()?
        .ancestors()
        .filter_map(|dir| dir.file_name()?.to_str())
        .find(|name| matcher.matches(name))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(v: Value) -> Record {
        match v {
            Value::Object(o) => o,
            _ => unreachable!("fixture must be an object"),
        }
    }

    #[test]
    fn vocabulary() {
        for k in ["dev_eui", "deveui", "devaddr", "device_id", "deviceid", "dev_eui_hex"] {
            assert!(is_identifier_field(k), "{k}");
        }
        for k in ["time", "rssi", "device_name", "gateway_id"] {
            assert!(!is_identifier_field(k), "{k}");
        }
    }

    #[test]
    fn payload_identifier_at_top_level() {
        let r = rec(json!({"time": "t0", "devEUI": "a84041000181c9e1"}));
        let id = IdentityResolver::default()
            .resolve(&r, Path::new("/data/site/up.json"))
            .unwrap();
        assert_eq!(id, Identity::new("a84041000181c9e1", IdentitySource::Payload));
    }

    #[test]
    fn payload_identifier_nested_in_objects_and_lists() {
        let r = rec(json!({
            "meta": {"x": 1},
            "rxInfo": [{"rssi": -80}, {"deviceInfo": {"devEui": "00aa"}}]
        }));
        assert_eq!(find_payload_id(&r).as_deref(), Some("00aa"));
    }

    #[test]
    fn first_match_in_key_order_wins() {
        let r = rec(json!({"devAddr": "0101", "devEUI": "ffff"}));
        assert_eq!(find_payload_id(&r).as_deref(), Some("0101"));
    }

    #[test]
    fn empty_and_null_identifiers_are_skipped() {
        let r = rec(json!({"dev_eui": "", "device_id": null, "nested": {"devaddr": 42}}));
        assert_eq!(find_payload_id(&r).as_deref(), Some("42"));
    }

    #[test]
    fn uuid_payload_loses_to_hex_folder() {
        let r = rec(json!({"deviceId": "a1b2c3d4-e5f6-7890-abcd-ef0123456789"}));
        let id = IdentityResolver::default()
            .resolve(&r, Path::new("/ds/0123456789abcdef/2024/up.json"))
            .unwrap();
        assert_eq!(id, Identity::new("0123456789abcdef", IdentitySource::FolderOverride));
    }

    #[test]
    fn uuid_payload_without_hex_folder_is_kept() {
        let r = rec(json!({"deviceId": "a1b2c3d4-e5f6-7890-abcd-ef0123456789"}));
        let id = IdentityResolver::default()
            .resolve(&r, Path::new("/ds/sensors/up.json"))
            .unwrap();
        assert_eq!(id.source, IdentitySource::Payload);
    }

    #[test]
    fn plain_payload_beats_hex_folder() {
        let r = rec(json!({"dev_eui": "1122334455667788"}));
        let id = IdentityResolver::default()
            .resolve(&r, Path::new("/ds/0123456789abcdef/up.json"))
            .unwrap();
        assert_eq!(id.key, "1122334455667788");
    }

    #[test]
    fn folder_used_when_payload_silent() {
        let r = rec(json!({"temp": 1}));
        let id = IdentityResolver::default()
            .resolve(&r, Path::new("/ds/A84041000181C9E1/day1/up.csv"))
            .unwrap();
        assert_eq!(id, Identity::new("A84041000181C9E1", IdentitySource::Folder));
    }

    #[test]
    fn nearest_hex_ancestor_wins() {
        let r = rec(json!({}));
        let id = IdentityResolver::default()
            .resolve(&r, Path::new("/ds/aaaaaaaa/bbbbbbbbbbbb/up.csv"))
            .unwrap();
        assert_eq!(id.key, "bbbbbbbbbbbb");
    }

    #[test]
    fn file_name_itself_is_not_a_segment() {
        let r = rec(json!({}));
        assert!(IdentityResolver::default()
            .resolve(&r, Path::new("/ds/site/0123456789abcdef"))
            .is_none());
    }

    #[test]
    fn no_identity_without_signals() {
        let r = rec(json!({"temp": 1}));
        assert!(IdentityResolver::default()
            .resolve(&r, Path::new("/ds/site/up.json"))
            .is_none());
    }

    #[test]
    fn strict_eui_pattern_rejects_short_hex() -> Result<(), regex::Error> {
        let r = rec(json!({}));
        let strict = IdentityResolver::new(&FolderIdPattern::Eui64)?;
        assert!(strict.resolve(&r, Path::new("/ds/deadbeef/up.csv")).is_none());
        assert!(strict
            .resolve(&r, Path::new("/ds/0123456789abcdef/up.csv"))
            .is_some());
        Ok(())
    }

    #[test]
    fn custom_pattern() -> Result<(), regex::Error> {
        let r = rec(json!({}));
        let custom = IdentityResolver::new(&FolderIdPattern::Custom("^node-[0-9]+$".into()))?;
        let id = custom.resolve(&r, Path::new("/ds/node-17/up.csv")).unwrap();
        assert_eq!(id.key, "node-17");
        assert!(IdentityResolver::new(&FolderIdPattern::Custom("(".into())).is_err());
        Ok(())
    }

    #[test]
    fn deterministic() {
        let r = rec(json!({"a": {"devEUI": "x1"}, "b": {"devEUI": "x2"}}));
        let res = IdentityResolver::default();
        let p = Path::new("/ds/up.json");
        assert_eq!(res.resolve(&r, p), res.resolve(&r, p));
    }

    #[test]
    fn rule_order() {
        let names: Vec<_> = IdentityResolver::default().rule_names().map(String::from).collect();
        assert_eq!(names, ["folder-override", "payload-field", "folder-segment"]);
    }

    fn ctx<'a>(record: &'a Record, path: &'a str, matcher: &'a FolderMatcher) -> ResolveContext<'a> {
        ResolveContext {
            record,
            path: Path::new(path),
            matcher,
            payload: OnceCell::new(),
            folder: OnceCell::new(),
        }
    }

    fn loose() -> FolderMatcher {
        FolderMatcher::Hex { min: 8, max: 32 }
    }

    #[test]
    fn override_rule_alone() {
        let m = loose();
        let uuid = rec(json!({"deviceId": "a1b2c3d4-e5f6-7890-abcd-ef0123456789"}));
        let plain = rec(json!({"deviceId": "a84041000181c9e1"}));
        let hex = "/ds/0123456789abcdef/up.json";

        assert_eq!(
            FolderOverrideRule.apply(&ctx(&uuid, hex, &m)),
            RuleOutcome::Resolved(Identity::new("0123456789abcdef", IdentitySource::FolderOverride))
        );
        assert_eq!(FolderOverrideRule.apply(&ctx(&plain, hex, &m)), RuleOutcome::Continue);
        assert_eq!(
            FolderOverrideRule.apply(&ctx(&uuid, "/ds/site/up.json", &m)),
            RuleOutcome::Continue
        );
    }

    #[test]
    fn payload_rule_alone() {
        let m = loose();
        let uuid = rec(json!({"deviceId": "a1b2c3d4-e5f6-7890-abcd-ef0123456789"}));
        // no override in front of it, so the UUID is taken as is
        assert_eq!(
            PayloadFieldRule.apply(&ctx(&uuid, "/ds/0123456789abcdef/up.json", &m)),
            RuleOutcome::Resolved(Identity::new(
                "a1b2c3d4-e5f6-7890-abcd-ef0123456789",
                IdentitySource::Payload
            ))
        );
        let silent = rec(json!({"temp": 1}));
        assert_eq!(
            PayloadFieldRule.apply(&ctx(&silent, "/ds/0123456789abcdef/up.json", &m)),
            RuleOutcome::Continue
        );
    }

    #[test]
    fn folder_rule_alone() {
        let m = loose();
        let r = rec(json!({"dev_eui": "1122334455667788"}));
        assert_eq!(
            FolderSegmentRule.apply(&ctx(&r, "/ds/0123456789abcdef/up.json", &m)),
            RuleOutcome::Resolved(Identity::new("0123456789abcdef", IdentitySource::Folder))
        );
        let strict = FolderMatcher::Hex { min: 16, max: 16 };
        assert_eq!(
            FolderSegmentRule.apply(&ctx(&r, "/ds/deadbeef/up.json", &strict)),
            RuleOutcome::Continue
        );
    }

    #[test]
    fn context_exposes_inputs_and_caches_candidates() {
        let m = loose();
        let r = rec(json!({"devAddr": "26011bda"}));
        let c = ctx(&r, "/ds/0123456789abcdef/up.json", &m);
        assert_eq!(c.record().get("devAddr"), Some(&json!("26011bda")));
        assert_eq!(c.path(), Path::new("/ds/0123456789abcdef/up.json"));
        assert_eq!(c.payload_candidate(), Some("26011bda"));
        assert_eq!(c.folder_candidate(), Some("0123456789abcdef"));
        assert_eq!(c.payload_candidate(), Some("26011bda"));
    }

    struct FileStemRule;

    impl IdentityRule for FileStemRule {
        fn name(&self) -> &str {
            "file-stem"
        }

        fn apply(&self, ctx: &ResolveContext<'_>) -> RuleOutcome {
            if ctx.record().contains_key("unit") {
                return RuleOutcome::Continue;
            }
            match ctx.path().file_stem().and_then(|s| s.to_str()) {
                Some(stem) => RuleOutcome::Resolved(Identity::new(stem, IdentitySource::ParentFolder)),
                None => RuleOutcome::Continue,
            }
        }
    }

    #[test]
    fn custom_chain_runs_in_given_order() -> Result<(), regex::Error> {
        let res = IdentityResolver::with_rules(
            &FolderIdPattern::default(),
            vec![Box::new(PayloadFieldRule), Box::new(FileStemRule)],
        )?;
        assert_eq!(res.rule_names().collect::<Vec<_>>(), ["payload-field", "file-stem"]);

        let p = Path::new("/ds/0123456789abcdef/meter-4.json");
        let uuid = rec(json!({"deviceId": "a1b2c3d4-e5f6-7890-abcd-ef0123456789"}));
        assert_eq!(res.resolve(&uuid, p).unwrap().source, IdentitySource::Payload);
        assert_eq!(res.resolve(&rec(json!({"v": 1})), p).unwrap().key, "meter-4");
        assert!(res.resolve(&rec(json!({"unit": "C"})), p).is_none());
        Ok(())
    }
}

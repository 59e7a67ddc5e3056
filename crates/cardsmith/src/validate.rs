//! Export validation.
//!
//! Runs a format's [`RuleSet`] over an [`ExportBundle`] in one pass. Errors
//! block the export, warnings are reported, and fixes are applied to the
//! bundle in place and recorded.
//!
//! | Rule             | Kind    | Check |
//! |------------------|---------|-------|
//! | `require_icon`   | error   | at least one `icon` |
//! | `unique_names`   | fix     | unique asset names, main icon named `main` |
//! | `embedded_refs`  | error   | `embeded://` references in the record resolve |
//! | `storage_exists` | error   | stored assets exist in storage |
//! | `content_hashes` | fix     | content hashes match the bytes |
//! | `singletons`     | error   | at most one `portrait-override` / `main-background` |
//! | `singletons`     | warning | `actor-<n>` tags number 1..N without gaps |

use std::collections::{BTreeSet, HashSet};

use cardsmith_card::asset::{kind, tags};
use cardsmith_common::hash;
use serde::Serialize;

use crate::export::ExportBundle;
use crate::paths;

/// Outcome of validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Changes applied to the bundle.
    pub fixes: Vec<String>,
}

/// Which rules apply to a format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleSet {
    pub require_icon: bool,
    pub unique_names: bool,
    pub embedded_refs: bool,
    pub storage_exists: bool,
    pub content_hashes: bool,
    pub singletons: bool,
}

impl RuleSet {
    pub const NONE: Self = Self {
        require_icon: false,
        unique_names: false,
        embedded_refs: false,
        storage_exists: false,
        content_hashes: false,
        singletons: false,
    };

    pub const CHARX: Self = Self {
        require_icon: true,
        unique_names: true,
        embedded_refs: true,
        storage_exists: true,
        content_hashes: true,
        singletons: true,
    };

    pub const VOXTA: Self = Self {
        require_icon: false,
        embedded_refs: false,
        ..Self::CHARX
    };

    pub const PNG: Self = Self {
        content_hashes: false,
        ..Self::VOXTA
    };

    pub const JSON: Self = Self::PNG;
}

/// Validate and fix `bundle` against `rules`.
pub fn validate(bundle: &mut ExportBundle, rules: &RuleSet) -> ValidationReport {
    let mut report = ValidationReport::default();

    if rules.require_icon && !bundle.assets.iter().any(|a| a.descriptor.kind == kind::ICON) {
        report.errors.push("card has no icon asset".into());
    }
    if rules.unique_names {
        unique_names(bundle, &mut report);
    }
    if rules.embedded_refs {
        embedded_refs(bundle, &mut report);
    }
    if rules.storage_exists {
        for asset in &bundle.assets {
            if let (Some(url), None) = (&asset.storage_url, &asset.data) {
                report.errors.push(format!(
                    "asset '{}' is missing from storage ({url})",
                    asset.descriptor.name
                ));
            }
        }
    }
    if rules.content_hashes {
        content_hashes(bundle, &mut report);
    }
    if rules.singletons {
        singletons(bundle, &mut report);
    }

    report.valid = report.errors.is_empty();
    tracing::debug!(
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        fixes = report.fixes.len(),
        "validated export bundle"
    );
    report
}

fn unique_names(bundle: &mut ExportBundle, report: &mut ValidationReport) {
    let main = bundle
        .assets
        .iter()
        .position(|a| a.descriptor.is_main && a.descriptor.kind == kind::ICON);
    let mut seen: HashSet<String> = HashSet::new();
    if let Some(i) = main {
        let d = &mut bundle.assets[i].descriptor;
        if d.name != "main" {
            report
                .fixes
                .push(format!("renamed main icon '{}' to 'main'", d.name));
            d.name = "main".into();
        }
        take_portrait_override(bundle, i, report);
        seen.insert("main".into());
    }

    let taken: HashSet<String> = bundle
        .assets
        .iter()
        .map(|a| a.descriptor.name.clone())
        .collect();

    for (i, asset) in bundle.assets.iter_mut().enumerate() {
        if Some(i) == main {
            continue;
        }
        let name = &mut asset.descriptor.name;
        if seen.insert(name.clone()) {
            continue;
        }
        let renamed = (2..)
            .map(|n| format!("{name}_{n}"))
            .find(|candidate| !taken.contains(candidate) && !seen.contains(candidate))
            .unwrap_or_else(|| name.clone());
        report
            .fixes
            .push(format!("renamed duplicate asset '{name}' to '{renamed}'"));
        seen.insert(renamed.clone());
        *name = renamed;
    }
}

/// Move `portrait-override` onto the main icon at `main` from icons it
/// displaced.
///
/// An icon named `main` gets the tag on import, so the one that loses the
/// name must also lose the tag or the next import tags both.
fn take_portrait_override(bundle: &mut ExportBundle, main: usize, report: &mut ValidationReport) {
    let mut moved = false;
    for (i, asset) in bundle.assets.iter_mut().enumerate() {
        let d = &mut asset.descriptor;
        if i == main || d.kind != kind::ICON || d.name != "main" {
            continue;
        }
        let before = d.tags.len();
        d.tags.retain(|t| t != tags::PORTRAIT_OVERRIDE);
        moved |= d.tags.len() != before;
    }
    if moved {
        bundle.assets[main]
            .descriptor
            .add_tag(tags::PORTRAIT_OVERRIDE);
        report
            .fixes
            .push(format!("moved '{}' to the main icon", tags::PORTRAIT_OVERRIDE));
    }
}

fn embedded_refs(bundle: &ExportBundle, report: &mut ValidationReport) {
    let mut record = bundle.record.clone();
    record.data_mut().assets.clear();
    let Ok(text) = record.to_json() else {
        report.errors.push("record cannot be serialized".into());
        return;
    };

    // Only stored assets are written; references to their old paths are
    // rewritten on encode.
    let mut known: HashSet<String> = HashSet::new();
    for asset in bundle.assets.iter().filter(|a| a.data.is_some()) {
        let d = &asset.descriptor;
        let ext = paths::safe_ext(&d.ext, &asset.mimetype);
        known.insert(paths::charx_member(&d.kind, &d.name, &ext, d.is_main));
        if let cardsmith_card::AssetUri::Embedded(path) = d.parsed_uri() {
            known.insert(path.to_owned());
        }
    }

    let Some(pattern) = paths::embedded_ref_pattern() else {
        return;
    };
    let missing: BTreeSet<&str> = pattern
        .captures_iter(&text)
        .filter_map(|c| c.get(2))
        .map(|m| m.as_str())
        .filter(|path| !known.contains(*path))
        .collect();
    if !missing.is_empty() {
        report.errors.push(format!(
            "record references missing assets: {}",
            missing.into_iter().collect::<Vec<_>>().join(", ")
        ));
    }
}

fn content_hashes(bundle: &mut ExportBundle, report: &mut ValidationReport) {
    let mut changed = 0usize;
    for asset in &mut bundle.assets {
        let Some(data) = &asset.data else { continue };
        let actual = hash::sha256_hex(data);
        if asset.content_hash.as_deref() != Some(actual.as_str()) {
            asset.content_hash = Some(actual);
            changed += 1;
        }
    }
    if changed > 0 {
        report
            .fixes
            .push(format!("recomputed content hashes for {changed} asset(s)"));
    }
}

fn singletons(bundle: &ExportBundle, report: &mut ValidationReport) {
    for tag in [tags::PORTRAIT_OVERRIDE, tags::MAIN_BACKGROUND] {
        let holders: Vec<&str> = bundle
            .assets
            .iter()
            .filter(|a| a.descriptor.has_tag(tag))
            .map(|a| a.descriptor.name.as_str())
            .collect();
        if holders.len() > 1 {
            report.errors.push(format!(
                "more than one asset tagged '{tag}': {}",
                holders.join(", ")
            ));
        }
    }

    let actors: BTreeSet<u32> = bundle
        .assets
        .iter()
        .flat_map(|a| a.descriptor.tags.iter())
        .filter_map(|t| tags::actor_index(t))
        .collect();
    let contiguous = actors.iter().copied().eq(1..=actors.len() as u32);
    if !contiguous {
        let found: Vec<String> = actors.iter().map(u32::to_string).collect();
        report.warnings.push(format!(
            "actor tags should number 1..{} without gaps, found {}",
            actors.len(),
            found.join(", ")
        ));
    }
}

#[cfg(test)]
mod tests {
    use cardsmith_card::{AssetDescriptor, CardData, CardRecord};

    use super::*;
    use crate::export::BundleAsset;

    fn stored(kind: &str, name: &str) -> BundleAsset {
        BundleAsset {
            descriptor: AssetDescriptor::new(kind, name, "png", ""),
            storage_url: Some(format!("mem://{name}.png")),
            content_hash: None,
            mimetype: "image/png".into(),
            data: Some(name.as_bytes().to_vec()),
        }
    }

    fn bundle(assets: Vec<BundleAsset>) -> ExportBundle {
        ExportBundle {
            card_id: "card".into(),
            record: CardRecord::V3(CardData::named("Ava")),
            assets,
        }
    }

    #[test]
    fn test_duplicate_names_are_renamed_in_order() {
        let mut b = bundle(vec![
            stored("emotion", "happy"),
            stored("emotion", "happy"),
            stored("emotion", "happy_2"),
            stored("emotion", "happy"),
        ]);
        let report = validate(&mut b, &RuleSet::JSON);
        let names: Vec<_> = b.assets.iter().map(|a| a.descriptor.name.as_str()).collect();
        assert_eq!(names, ["happy", "happy_3", "happy_2", "happy_4"]);
        assert_eq!(report.fixes.len(), 2);
        assert!(report.valid);

        let unique: HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
    }

    #[test]
    fn test_main_icon_effective_name() {
        let mut main = stored("icon", "front");
        main.descriptor.is_main = true;
        let mut b = bundle(vec![stored("background", "main"), main]);
        validate(&mut b, &RuleSet::CHARX);
        assert_eq!(b.assets[1].descriptor.name, "main");
        assert_eq!(b.assets[0].descriptor.name, "main_2");
    }

    #[test]
    fn test_displaced_main_icon_hands_over_portrait_override() {
        let mut front = stored("icon", "front");
        front.descriptor.is_main = true;
        let mut old_main = stored("icon", "main");
        old_main.descriptor.tags = vec!["actor-1".into(), "portrait-override".into()];
        let mut b = bundle(vec![front, old_main]);

        let report = validate(&mut b, &RuleSet::CHARX);
        assert!(report.valid, "{:?}", report.errors);
        assert_eq!(b.assets[0].descriptor.name, "main");
        assert_eq!(b.assets[0].descriptor.tags, vec!["portrait-override"]);
        assert_eq!(b.assets[1].descriptor.name, "main_2");
        assert_eq!(b.assets[1].descriptor.tags, vec!["actor-1"]);
        assert!(report.fixes.iter().any(|f| f.contains("portrait-override")));
    }

    #[test]
    fn test_charx_requires_icon() {
        let mut b = bundle(vec![stored("background", "sky")]);
        let report = validate(&mut b, &RuleSet::CHARX);
        assert!(!report.valid);
        assert!(report.errors[0].contains("no icon"));

        let mut b = bundle(vec![stored("background", "sky")]);
        assert!(validate(&mut b, &RuleSet::VOXTA).valid);
    }

    #[test]
    fn test_singleton_tags_collect_all_errors() {
        let mut a = stored("icon", "a");
        a.descriptor.tags = vec!["portrait-override".into()];
        let mut b_ = stored("icon", "b");
        b_.descriptor.tags = vec!["portrait-override".into()];
        let mut c = stored("background", "c");
        c.descriptor.tags = vec!["main-background".into()];
        let mut d = stored("background", "d");
        d.descriptor.tags = vec!["main-background".into()];

        let mut b = bundle(vec![a, b_, c, d]);
        let report = validate(&mut b, &RuleSet::PNG);
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 2);
    }

    #[test]
    fn test_actor_gap_is_a_warning() {
        let mut a = stored("icon", "a");
        a.descriptor.tags = vec!["actor-1".into()];
        let mut c = stored("icon", "c");
        c.descriptor.tags = vec!["actor-3".into()];
        let mut b = bundle(vec![a, c]);
        let report = validate(&mut b, &RuleSet::JSON);
        assert!(report.valid);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_missing_storage_and_hash_fix() {
        let mut gone = stored("icon", "gone");
        gone.data = None;
        let mut b = bundle(vec![stored("icon", "main"), gone]);
        let report = validate(&mut b, &RuleSet::CHARX);
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("gone")));
        assert!(report.fixes.iter().any(|f| f.contains("content hashes")));
        assert_eq!(
            b.assets[0].content_hash.as_deref(),
            Some(hash::sha256_hex(b"main").as_str())
        );
    }

    #[test]
    fn test_embedded_references() {
        let mut b = bundle(vec![stored("icon", "main")]);
        b.record.data_mut().description =
            "<img src=\"embeded://emotion/happy.png\"> <img src=\"embeded://icon/main.png\">".into();
        let report = validate(&mut b, &RuleSet::CHARX);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("emotion/happy.png"));
        assert!(!report.errors[0].contains("icon/main.png"));
    }

    #[test]
    fn test_embedded_reference_to_unstored_asset() {
        let mut gone = stored("emotion", "sad");
        gone.descriptor.uri = "embeded://assets/emotion/sad.png".into();
        gone.storage_url = None;
        gone.data = None;
        let mut kept = stored("emotion", "happy");
        kept.descriptor.uri = "embeded://assets/emotion/happy.png".into();

        let mut b = bundle(vec![stored("icon", "main"), kept, gone]);
        b.record.data_mut().description =
            "embeded://assets/emotion/happy.png embeded://assets/emotion/sad.png".into();
        let report = validate(&mut b, &RuleSet::CHARX);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("assets/emotion/sad.png"));
        assert!(!report.errors[0].contains("happy"));
    }
}

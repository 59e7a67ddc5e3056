//! Main icon selection.
//!
//! Exactly one resolved asset ends up flagged as the card's main portrait,
//! or none when nothing qualifies. Candidates are tried in a fixed order and
//! the first hit wins; every step after the explicit flag explains itself
//! with a warning.

use cardsmith_card::asset::{kind, DEFAULT_SCHEME};
use cardsmith_card::{AssetDescriptor, AssetUri};

use crate::resolve::{AssetSource, Resolution, ResolvedAsset};

/// Which rule picked the main icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainIconStep {
    /// A source descriptor was flagged `isMain`.
    Explicit,
    /// An `icon` named `main`.
    NamedMain,
    /// The PNG container image.
    ContainerImage,
    /// The first `icon` in source order.
    FirstIcon,
    /// No icon available.
    None,
}

/// Result of selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainIconSelection {
    pub step: MainIconStep,
    /// Index into the resolutions of the chosen asset.
    pub index: Option<usize>,
    pub warning: Option<String>,
}

/// Pick the main icon and flag it.
///
/// `container_image` is the PNG container with its text chunks stripped; it
/// is only passed for PNG imports. When it is used, it binds to an existing
/// non-resolved `icon`/`main` `ccdefault:` descriptor if there is one, and is
/// appended as a new `icon`/`main` asset otherwise.
pub fn select_main_icon(
    resolutions: &mut Vec<Resolution>,
    container_image: Option<&[u8]>,
) -> MainIconSelection {
    let (step, index, warning) = choose(resolutions, container_image);

    for (i, resolution) in resolutions.iter_mut().enumerate() {
        resolution.descriptor_mut().is_main = Some(i) == index;
    }

    if let Some(warning) = &warning {
        tracing::debug!(?step, %warning, "main icon fallback");
    }

    MainIconSelection {
        step,
        index,
        warning,
    }
}

fn choose(
    resolutions: &mut Vec<Resolution>,
    container_image: Option<&[u8]>,
) -> (MainIconStep, Option<usize>, Option<String>) {
    if let Some(i) = resolutions
        .iter()
        .position(|r| resolved_descriptor(r).is_some_and(|d| d.is_main))
    {
        return (MainIconStep::Explicit, Some(i), None);
    }

    if let Some(i) = resolutions
        .iter()
        .position(|r| resolved_descriptor(r).is_some_and(AssetDescriptor::is_main_icon_by_name))
    {
        let name = &resolutions[i].descriptor().name;
        return (
            MainIconStep::NamedMain,
            Some(i),
            Some(format!("no asset flagged as main; using icon '{name}'")),
        );
    }

    if let Some(image) = container_image {
        let slot = resolutions.iter().position(|r| {
            !r.is_resolved() && {
                let d = r.descriptor();
                d.is_main_icon_by_name() && matches!(d.parsed_uri(), AssetUri::Default)
            }
        });
        let mut descriptor = match slot {
            Some(i) => resolutions[i].descriptor().clone(),
            None => {
                let mut d = AssetDescriptor::new(kind::ICON, "main", "png", DEFAULT_SCHEME);
                d.order_index = resolutions.len();
                d
            }
        };
        descriptor.ext = "png".into();
        let asset = Resolution::Resolved(ResolvedAsset::new(
            descriptor,
            image.to_vec(),
            AssetSource::Container,
        ));
        let index = match slot {
            Some(i) => {
                resolutions[i] = asset;
                i
            }
            None => {
                resolutions.push(asset);
                resolutions.len() - 1
            }
        };
        return (
            MainIconStep::ContainerImage,
            Some(index),
            Some("no main icon in the card; using the PNG container image".into()),
        );
    }

    if let Some(i) = resolutions
        .iter()
        .position(|r| resolved_descriptor(r).is_some_and(|d| d.kind == kind::ICON))
    {
        let name = &resolutions[i].descriptor().name;
        return (
            MainIconStep::FirstIcon,
            Some(i),
            Some(format!("no main icon; using first icon '{name}'")),
        );
    }

    (
        MainIconStep::None,
        None,
        Some("card has no icon asset".into()),
    )
}

fn resolved_descriptor(r: &Resolution) -> Option<&AssetDescriptor> {
    r.as_resolved().map(|a| &a.descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(kind: &str, name: &str) -> Resolution {
        Resolution::Resolved(ResolvedAsset::new(
            AssetDescriptor::new(kind, name, "png", format!("embeded://{kind}/{name}.png")),
            b"\x89PNG\r\n\x1a\n".to_vec(),
            AssetSource::Archive,
        ))
    }

    fn main_count(resolutions: &[Resolution]) -> usize {
        resolutions.iter().filter(|r| r.descriptor().is_main).count()
    }

    #[test]
    fn test_explicit_flag_wins() {
        let mut rs = vec![resolved("icon", "main"), resolved("icon", "alt")];
        rs[1].descriptor_mut().is_main = true;
        let sel = select_main_icon(&mut rs, None);
        assert_eq!(sel.step, MainIconStep::Explicit);
        assert_eq!(sel.index, Some(1));
        assert!(sel.warning.is_none());
        assert_eq!(main_count(&rs), 1);
    }

    #[test]
    fn test_explicit_flag_ignored_when_unresolved() {
        let mut remote = AssetDescriptor::new("icon", "far", "png", "https://x/y.png");
        remote.is_main = true;
        let mut rs = vec![Resolution::Remote(remote), resolved("icon", "main")];
        let sel = select_main_icon(&mut rs, None);
        assert_eq!(sel.step, MainIconStep::NamedMain);
        assert!(!rs[0].descriptor().is_main);
        assert_eq!(main_count(&rs), 1);
    }

    #[test]
    fn test_container_binds_to_default_descriptor() {
        let mut rs = vec![
            Resolution::Remote(AssetDescriptor::new("icon", "main", "png", "ccdefault:")),
            resolved("emotion", "happy"),
        ];
        let sel = select_main_icon(&mut rs, Some(b"\x89PNG\r\n\x1a\nstripped"));
        assert_eq!(sel.step, MainIconStep::ContainerImage);
        assert_eq!(sel.index, Some(0));
        assert_eq!(rs.len(), 2);
        assert!(rs[0].is_resolved());
        assert_eq!(main_count(&rs), 1);
    }

    #[test]
    fn test_container_appended_without_descriptor() {
        let mut rs = vec![resolved("emotion", "happy")];
        let sel = select_main_icon(&mut rs, Some(b"\x89PNG\r\n\x1a\n"));
        assert_eq!(sel.index, Some(1));
        let main = rs[1].as_resolved().unwrap();
        assert_eq!(main.descriptor.name, "main");
        assert_eq!(main.source, AssetSource::Container);
    }

    #[test]
    fn test_first_icon_with_one_warning() {
        let mut rs = vec![
            resolved("background", "sky"),
            resolved("icon", "front"),
            resolved("icon", "side"),
        ];
        let sel = select_main_icon(&mut rs, None);
        assert_eq!(sel.step, MainIconStep::FirstIcon);
        assert_eq!(sel.index, Some(1));
        assert!(sel.warning.is_some());
        assert_eq!(main_count(&rs), 1);
    }

    #[test]
    fn test_no_icon() {
        let mut rs = vec![resolved("sound", "hello")];
        let sel = select_main_icon(&mut rs, None);
        assert_eq!(sel.step, MainIconStep::None);
        assert_eq!(main_count(&rs), 0);
    }
}

// ── Component discovery ──
//
// Shelly.GetStatus keys every component instance as `<kind>:<id>`
// (`switch:0`, `cover:1`, `input:0`, ...). Only switches and covers have
// metrics, so everything else is ignored.

use tracing::info;

use crate::error::CoreError;
use crate::probe::DeviceProbe;

/// Component kinds the exporter tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Switch,
    Cover,
}

impl ComponentKind {
    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "switch" => Some(Self::Switch),
            "cover" => Some(Self::Cover),
            _ => None,
        }
    }
}

/// Component ids found on one device, each list strictly ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Components {
    pub switch_ids: Vec<u32>,
    pub cover_ids: Vec<u32>,
}

/// Parse a status key of the exact form `switch:<digits>` or `cover:<digits>`.
pub fn parse_component_key(key: &str) -> Option<(ComponentKind, u32)> {
    let (prefix, suffix) = key.split_once(':')?;
    let kind = ComponentKind::from_prefix(prefix)?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Digits-only, so the only possible failure is overflow.
    let id = suffix.parse().ok()?;
    Some((kind, id))
}

/// Extract switch and cover ids from a status key set.
pub fn discover<I, S>(keys: I) -> Components
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut components = Components::default();
    for key in keys {
        match parse_component_key(key.as_ref()) {
            Some((ComponentKind::Switch, id)) => components.switch_ids.push(id),
            Some((ComponentKind::Cover, id)) => components.cover_ids.push(id),
            None => {}
        }
    }
    components.switch_ids.sort_unstable();
    components.switch_ids.dedup();
    components.cover_ids.sort_unstable();
    components.cover_ids.dedup();
    components
}

/// Fetch the device's aggregate status and discover its components.
///
/// On failure nothing partial is returned.
pub async fn discover_components<P: DeviceProbe>(probe: &P) -> Result<Components, CoreError> {
    let keys = probe
        .status_keys()
        .await
        .map_err(|e| e.in_step("component discovery"))?;
    let components = discover(keys);
    info!(
        switch_ids = ?components.switch_ids,
        cover_ids = ?components.cover_ids,
        "discovered components"
    );
    Ok(components)
}

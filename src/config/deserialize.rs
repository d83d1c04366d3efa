// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Accepts the default target as "user@host:port" or as a detailed map.

use serde::Deserialize;

use crate::ssh::Target;

pub fn deserialize_target_option<'de, D>(deserializer: D) -> Result<Option<Target>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<TargetEntry> = Option::deserialize(deserializer)?;
    opt.map(TargetEntry::into_target)
        .transpose()
        .map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TargetEntry {
    Simple(String),
    Detailed(Target),
}

impl TargetEntry {
    fn into_target(self) -> Result<Target, String> {
        match self {
            TargetEntry::Simple(s) => Target::parse(&s),
            TargetEntry::Detailed(t) if t.host.trim().is_empty() => {
                Err("hostname cannot be empty".to_string())
            }
            TargetEntry::Detailed(t) => Ok(t),
        }
    }
}

//! Tag-group discovery.
//!
//! Templates opt into pipelines by carrying tags of the form
//! `"<prefix>-<digits>"`, e.g. `story-001`, `story-002`. All templates
//! sharing a prefix form one group; the numeric suffix orders the steps.

use crate::template::PromptTemplate;
use std::collections::BTreeMap;

/// A parsed pipeline tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineTag {
    /// Group name, the part before the final hyphen.
    pub prefix: String,
    /// Numeric step suffix.
    pub order: u32,
}

/// Parse `"<prefix>-<digits>"`. The prefix must be non-empty and the
/// suffix all digits; anything else is not a pipeline tag.
pub fn parse_tag(tag: &str) -> Option<PipelineTag> {
    let (prefix, suffix) = tag.rsplit_once('-')?;
    if prefix.is_empty() || suffix.is_empty() {
        return None;
    }
    if !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let order = suffix.parse().ok()?;
    Some(PipelineTag {
        prefix: prefix.to_string(),
        order,
    })
}

/// Group templates by tag prefix, each group sorted ascending by the
/// numeric suffix. Ties keep the templates' original order. Templates
/// without a matching tag land in no group; a template with several
/// pipeline tags lands in each of those groups.
pub fn extract_tag_groups(
    templates: &[PromptTemplate],
) -> BTreeMap<String, Vec<(u32, PromptTemplate)>> {
    let mut groups: BTreeMap<String, Vec<(u32, PromptTemplate)>> = BTreeMap::new();

    for template in templates {
        for tag in &template.tags {
            if let Some(parsed) = parse_tag(tag) {
                groups
                    .entry(parsed.prefix)
                    .or_default()
                    .push((parsed.order, template.clone()));
            }
        }
    }

    for members in groups.values_mut() {
        // stable sort keeps original order for equal suffixes
        members.sort_by_key(|(order, _)| *order);
    }

    groups
}

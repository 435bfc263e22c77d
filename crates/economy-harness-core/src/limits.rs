//! Vocabulary seeds from `cfglimitsdefinition.xml`.
//!
//! ```xml
//! <lists>
//!     <categories><category name="tools"/></categories>
//!     <tags><tag name="floor"/></tags>
//!     <usageflags><usage name="Military"/></usageflags>
//!     <valueflags><value name="Tier1"/></valueflags>
//! </lists>
//! ```

use std::collections::BTreeMap;

use crate::error::Error;
use crate::normalize::Vocabulary;
use crate::xml::parse_document;

fn section_tag(vocab: Vocabulary) -> &'static str {
    vocab.table()
}

/// Term names per vocabulary, deduplicated, in document order.
pub fn parse_limits(xml: &str) -> Result<BTreeMap<Vocabulary, Vec<String>>, Error> {
    let root = parse_document(xml)?;
    let mut out: BTreeMap<Vocabulary, Vec<String>> = BTreeMap::new();
    for vocab in Vocabulary::ALL {
        let names = out.entry(vocab).or_default();
        for section in root
            .descendants()
            .into_iter()
            .filter(|n| n.tag == section_tag(vocab))
        {
            for item in section.children.iter().filter(|c| c.tag == vocab.key()) {
                if let Some(name) = item.attr("name").map(str::trim).filter(|n| !n.is_empty()) {
                    if !names.iter().any(|n| n == name) {
                        names.push(name.to_string());
                    }
                }
            }
        }
    }
    Ok(out)
}

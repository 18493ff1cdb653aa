use super::*;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SelectorStep {
    pub(crate) tag: Option<String>,
    pub(crate) id: Option<String>,
}

impl SelectorStep {
    pub(crate) fn id_only(&self) -> Option<&str> {
        if self.tag.is_none() {
            self.id.as_deref()
        } else {
            None
        }
    }
}

/// Steps of a descendant chain, outermost first: `#t tbody tr` parses to
/// `[#t, tbody, tr]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SelectorChain {
    pub(crate) steps: Vec<SelectorStep>,
}

impl SelectorChain {
    pub(crate) fn subject(&self) -> &SelectorStep {
        // parse_selector_chain never yields an empty chain
        &self.steps[self.steps.len() - 1]
    }

    pub(crate) fn single_id(&self) -> Option<&str> {
        if self.steps.len() == 1 {
            self.steps[0].id_only()
        } else {
            None
        }
    }
}

pub(crate) fn parse_selector_chain(selector: &str) -> Result<SelectorChain> {
    let trimmed = selector.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidSelector(selector.into()));
    }

    let mut steps = Vec::new();
    for token in tokenize_selector(trimmed) {
        let step = parse_selector_step(token)
            .ok_or_else(|| Error::InvalidSelector(selector.into()))?;
        steps.push(step);
    }

    if steps.is_empty() {
        return Err(Error::InvalidSelector(selector.into()));
    }
    Ok(SelectorChain { steps })
}

pub(crate) fn tokenize_selector(selector: &str) -> Vec<&str> {
    selector
        .split(|ch: char| ch.is_ascii_whitespace())
        .filter(|token| !token.is_empty())
        .collect()
}

// `tag`, `#id` or `tag#id`; anything else is outside the supported grammar.
pub(crate) fn parse_selector_step(part: &str) -> Option<SelectorStep> {
    let mut step = SelectorStep::default();
    let mut i = 0usize;

    if part.as_bytes().first() != Some(&b'#') {
        let (tag, next) = parse_selector_ident(part, 0)?;
        step.tag = Some(tag.to_ascii_lowercase());
        i = next;
    }

    if i < part.len() {
        if part.as_bytes()[i] != b'#' {
            return None;
        }
        let (id, next) = parse_selector_ident(part, i + 1)?;
        step.id = Some(id);
        i = next;
    }

    if i != part.len() {
        return None;
    }
    Some(step)
}

pub(crate) fn parse_selector_ident(src: &str, start: usize) -> Option<(String, usize)> {
    let bytes = src.as_bytes();
    let mut end = start;
    while end < bytes.len() && is_selector_ident_char(bytes[end]) {
        end += 1;
    }
    if end == start {
        return None;
    }
    Some((src.get(start..end)?.to_string(), end))
}

pub(crate) fn is_selector_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(tag: Option<&str>, id: Option<&str>) -> SelectorStep {
        SelectorStep {
            tag: tag.map(str::to_string),
            id: id.map(str::to_string),
        }
    }

    #[test]
    fn parses_tag_id_and_compound_steps() -> Result<()> {
        let chain = parse_selector_chain("button")?;
        assert_eq!(chain.steps, vec![step(Some("button"), None)]);

        let chain = parse_selector_chain("#tabla-productos")?;
        assert_eq!(chain.single_id(), Some("tabla-productos"));

        let chain = parse_selector_chain("TR#row_1")?;
        assert_eq!(chain.steps, vec![step(Some("tr"), Some("row_1"))]);
        assert_eq!(chain.single_id(), None);
        Ok(())
    }

    #[test]
    fn parses_descendant_chains_with_extra_whitespace() -> Result<()> {
        let chain = parse_selector_chain("  #tabla-productos \t tbody   tr ")?;
        assert_eq!(
            chain.steps,
            vec![
                step(None, Some("tabla-productos")),
                step(Some("tbody"), None),
                step(Some("tr"), None),
            ]
        );
        assert_eq!(chain.subject(), &step(Some("tr"), None));
        Ok(())
    }

    #[test]
    fn rejects_malformed_and_unsupported_selectors() {
        for selector in [
            "", "   ", "#", "##a", "a#", "#a#b", "div.note", "[id]", "a > b", "a,b", "*",
            "li:first-child", "#a b#", "tr#",
        ] {
            assert!(
                matches!(
                    parse_selector_chain(selector),
                    Err(Error::InvalidSelector(_))
                ),
                "selector {selector:?} should be rejected"
            );
        }
    }
}

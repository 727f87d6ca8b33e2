//! Inline `style` attribute access.

/// Parsed `style="..."` declarations, property names lowercased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineStyle {
    declarations: Vec<(String, String)>,
}

impl InlineStyle {
    pub fn parse(input: &str) -> Self {
        let declarations = input
            .split(';')
            .filter_map(|declaration| {
                let (name, value) = declaration.split_once(':')?;
                let name = name.trim().to_ascii_lowercase();
                if name.is_empty() {
                    return None;
                }
                let value = value
                    .trim()
                    .trim_end_matches("!important")
                    .trim()
                    .to_ascii_lowercase();
                Some((name, value))
            })
            .collect();

        Self { declarations }
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Last declaration wins, as in the cascade.
    pub fn get(&self, property: &str) -> Option<&str> {
        self.declarations
            .iter()
            .rev()
            .find(|(name, _)| name.eq_ignore_ascii_case(property))
            .map(|(_, value)| value.as_str())
    }

    pub fn position(&self) -> Option<&str> {
        self.get("position")
    }

    pub fn is_out_of_flow(&self) -> bool {
        matches!(self.position(), Some("fixed" | "absolute"))
    }

    pub fn z_index(&self) -> Option<i64> {
        self.get("z-index")?.parse().ok()
    }

    pub fn opacity(&self) -> Option<f64> {
        self.get("opacity")?.parse().ok()
    }

    /// Zero opacity, hidden visibility or a fully transparent background.
    pub fn is_visually_hidden(&self) -> bool {
        if self.opacity().is_some_and(|opacity| opacity <= 0.0) {
            return true;
        }
        if self.get("visibility") == Some("hidden") {
            return true;
        }
        ["background", "background-color"].iter().any(|property| {
            self.get(property).is_some_and(|value| {
                value.contains("transparent") || is_zero_alpha(value)
            })
        })
    }

    /// Declared geometry spans the whole viewport.
    pub fn covers_viewport(&self) -> bool {
        let full = |property: &str| {
            self.get(property)
                .is_some_and(|value| matches!(value, "100%" | "100vw" | "100vh"))
        };
        let zero = |property: &str| {
            self.get(property)
                .is_some_and(|value| matches!(value, "0" | "0px" | "0%"))
        };

        (full("width") && full("height"))
            || self.get("inset").is_some_and(|value| {
                value
                    .split_ascii_whitespace()
                    .all(|part| matches!(part, "0" | "0px" | "0%"))
            })
            || (zero("top") && zero("left") && zero("right") && zero("bottom"))
    }
}

fn is_zero_alpha(value: &str) -> bool {
    let compact: String = value.chars().filter(|ch| !ch.is_ascii_whitespace()).collect();
    compact.starts_with("rgba(") && (compact.ends_with(",0)") || compact.ends_with(",0.0)"))
}

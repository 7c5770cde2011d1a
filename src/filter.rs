use crate::model::Event;

/// Case-insensitive substring match against an ordered list of body names.
#[derive(Debug, Clone)]
pub struct AllowList {
    entries: Vec<String>,
    lowered: Vec<String>,
}

impl AllowList {
    pub fn new(entries: &[String]) -> Self {
        Self {
            entries: entries.to_vec(),
            lowered: entries.iter().map(|v| v.to_lowercase()).collect(),
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn is_allowed(&self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        let lowered = text.to_lowercase();
        self.lowered.iter().any(|name| lowered.contains(name.as_str()))
    }

    /// Title first; a noisy title is rescued by the row context or the
    /// detail link.
    pub fn admits(&self, event: &Event) -> bool {
        self.is_allowed(&event.title)
            || self.is_allowed(&event.context)
            || event
                .detail_url
                .as_deref()
                .is_some_and(|url| self.is_allowed(url))
    }

    pub fn retain(&self, events: Vec<Event>) -> Vec<Event> {
        events.into_iter().filter(|e| self.admits(e)).collect()
    }
}

/// Tracks which left rows found a match, by ordinal in the left input.
#[derive(Debug, Default)]
pub struct OuterJoinTracker {
    matches: Vec<bool>,
}

impl OuterJoinTracker {
    pub fn set_match(&mut self, idx: usize) {
        if idx >= self.matches.len() {
            self.matches.resize(idx + 1, false);
        }
        self.matches[idx] = true;
    }

    pub fn is_match(&self, idx: usize) -> bool {
        self.matches.get(idx).copied().unwrap_or(false)
    }
}

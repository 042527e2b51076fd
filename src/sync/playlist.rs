//! Per-screen playlists
//!
//! Indices are 1-based and stay contiguous: inserting or removing an entry
//! renumbers everything after it.

use crate::resolve::is_indirect;

const MAX_TITLE_CHARS: usize = 40;

/// One playlist item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    /// 1-based position
    pub index: usize,
    pub url: String,
    pub title: String,
}

impl PlaylistEntry {
    fn new(index: usize, url: String) -> Self {
        let title = title_for(&url);
        Self { index, url, title }
    }
}

/// Display title derived from a URL
///
/// Video-sharing links show their video id; anything else shows the last
/// path segment without its query.
pub fn title_for(url: &str) -> String {
    if is_indirect(url) {
        return match video_id(url) {
            Some(id) => format!("YouTube: {id}"),
            None => "YouTube Video".to_string(),
        };
    }

    let name = url
        .rsplit_once('/')
        .map(|(_, tail)| tail)
        .filter(|tail| !tail.is_empty());
    let Some(name) = name else {
        return "Video".to_string();
    };
    let name = match name.split_once('?') {
        Some((head, _)) if !head.is_empty() => head,
        _ => name,
    };

    if name.chars().count() > MAX_TITLE_CHARS {
        let short: String = name.chars().take(MAX_TITLE_CHARS - 3).collect();
        format!("{short}...")
    } else {
        name.to_string()
    }
}

fn video_id(url: &str) -> Option<String> {
    let tail = url
        .split_once("youtu.be/")
        .or_else(|| url.split_once("v="))
        .map(|(_, tail)| tail)?;
    let id: String = tail
        .chars()
        .take_while(|c| *c != '?' && *c != '&')
        .take(11)
        .collect();
    (!id.is_empty()).then_some(id)
}

/// Ordered list of URLs with a cursor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playlist {
    entries: Vec<PlaylistEntry>,
    /// 0-based cursor
    current: usize,
    enabled: bool,
    looping: bool,
}

impl Default for Playlist {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            current: 0,
            enabled: true,
            looping: true,
        }
    }
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `url`; returns its index
    pub fn add(&mut self, url: impl Into<String>) -> usize {
        let index = self.entries.len() + 1;
        self.entries.push(PlaylistEntry::new(index, url.into()));
        index
    }

    /// Insert `url` at `position`, clamped to `1..=len+1`
    pub fn insert(&mut self, position: usize, url: impl Into<String>) -> usize {
        let position = position.clamp(1, self.entries.len() + 1);
        self.entries
            .insert(position - 1, PlaylistEntry::new(position, url.into()));
        self.reindex();
        position
    }

    /// Remove the entry at `index`
    pub fn remove(&mut self, index: usize) -> Option<PlaylistEntry> {
        if index < 1 || index > self.entries.len() {
            return None;
        }
        let removed = self.entries.remove(index - 1);
        self.reindex();
        if self.current >= self.entries.len() {
            self.current = self.entries.len().saturating_sub(1);
        }
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.current = 0;
    }

    pub fn current(&self) -> Option<&PlaylistEntry> {
        self.entries.get(self.current)
    }

    pub fn get(&self, index: usize) -> Option<&PlaylistEntry> {
        index.checked_sub(1).and_then(|i| self.entries.get(i))
    }

    /// Advance the cursor
    ///
    /// Wraps to the first entry when looping; at the end of a non-looping
    /// playlist the cursor stays on the last entry and `None` is returned.
    pub fn next(&mut self) -> Option<&PlaylistEntry> {
        if self.entries.is_empty() {
            return None;
        }
        if self.current + 1 < self.entries.len() {
            self.current += 1;
        } else if self.looping {
            self.current = 0;
        } else {
            self.current = self.entries.len() - 1;
            return None;
        }
        self.current()
    }

    /// Step the cursor back, wrapping when looping
    pub fn previous(&mut self) -> Option<&PlaylistEntry> {
        if self.entries.is_empty() {
            return None;
        }
        if self.current > 0 {
            self.current -= 1;
        } else if self.looping {
            self.current = self.entries.len() - 1;
        }
        self.current()
    }

    pub fn jump_to(&mut self, index: usize) -> Option<&PlaylistEntry> {
        if index < 1 || index > self.entries.len() {
            return None;
        }
        self.current = index - 1;
        self.current()
    }

    pub fn has_next(&self) -> bool {
        !self.entries.is_empty() && (self.looping || self.current + 1 < self.entries.len())
    }

    pub fn entries(&self) -> &[PlaylistEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 1-based index of the cursor
    pub fn current_index(&self) -> usize {
        self.current + 1
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// Whether end-of-video handling should consult this playlist
    pub fn is_active(&self) -> bool {
        self.enabled && !self.entries.is_empty()
    }

    fn reindex(&mut self) {
        for (i, entry) in self.entries.iter_mut().enumerate() {
            entry.index = i + 1;
        }
    }
}

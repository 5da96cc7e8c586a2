//! # Vendor trace state
//!
//! A bounded, ordered list of `vendor=value` entries carried alongside a trace
//! context when it crosses a process boundary. The text form is the value of a
//! `tracestate` header: entries separated by `,`, keys case-sensitive, no
//! escaping beyond the delimiter.
//!
//! Unlike [`opentelemetry::trace::TraceState`], this list never rejects its
//! input. Keys and values are opaque, and an oversized header is truncated
//! instead of refused.
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Maximum number of entries kept in a [`TraceState`].
pub const MAX_ENTRIES: usize = 32;

/// Entries longer than this many bytes are dropped first when a parsed header
/// holds more than [`MAX_ENTRIES`] entries.
pub const ENTRY_LENGTH_THRESHOLD: usize = 128;

/// Ordered list of vendor-specific `key=value` entries.
///
/// The most recently added vendor comes first. Every mutation returns a new
/// value, the receiver is never changed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TraceState(Vec<String>);

impl TraceState {
    /// Parses the value of a `tracestate` header. Empty list items are omitted.
    ///
    /// When the header holds more than [`MAX_ENTRIES`] items, entries longer
    /// than [`ENTRY_LENGTH_THRESHOLD`] are skipped only until the items left
    /// fit into the list; from that point on the remaining items are kept
    /// as-is, oversized or not. If skipping is not enough, the list is cut
    /// after [`MAX_ENTRIES`] entries.
    ///
    /// # Examples
    ///
    /// ```
    /// use opentelemetry_correlation::TraceState;
    ///
    /// let state = TraceState::parse("in=1234;5678,,rojo=00f067aa0ba902b7");
    /// assert_eq!(state.len(), 2);
    /// assert_eq!(state.to_string(), "in=1234;5678,rojo=00f067aa0ba902b7");
    /// ```
    pub fn parse(header: &str) -> Self {
        let items: Vec<&str> = header.split(',').filter(|item| !item.is_empty()).collect();
        if items.len() <= MAX_ENTRIES {
            return TraceState(items.into_iter().map(String::from).collect());
        }

        let mut entries = Vec::with_capacity(MAX_ENTRIES);
        let mut skipped = 0;
        for (i, item) in items.iter().enumerate() {
            if entries.len() == MAX_ENTRIES {
                break;
            }

            // the rest fits without filtering any further
            if items.len() - skipped <= MAX_ENTRIES {
                entries.extend(items[i..].iter().map(|item| item.to_string()));
                break;
            }

            if item.len() > ENTRY_LENGTH_THRESHOLD {
                skipped += 1;
                continue;
            }

            entries.push(item.to_string());
        }

        TraceState(entries)
    }

    /// Returns a new state starting with `vendor=data`.
    ///
    /// Any previous entry of the same vendor is removed and the list is
    /// truncated to [`MAX_ENTRIES`]. An empty `vendor` returns the state
    /// unchanged.
    pub fn add(&self, vendor: &str, data: &str) -> TraceState {
        if vendor.is_empty() {
            return self.clone();
        }

        let mut entries = Vec::with_capacity(self.0.len() + 1);
        entries.push(format!("{}={}", vendor, data));
        entries.extend(self.remove(vendor).0);
        entries.truncate(MAX_ENTRIES);

        TraceState(entries)
    }

    /// Returns a new state without the entries of `vendor`. An empty `vendor`
    /// returns the state unchanged.
    pub fn remove(&self, vendor: &str) -> TraceState {
        if vendor.is_empty() {
            return self.clone();
        }

        let prefix = vendor_prefix(vendor);
        TraceState(
            self.0
                .iter()
                .filter(|entry| !entry.starts_with(&prefix))
                .cloned()
                .collect(),
        )
    }

    /// Retrieves the data stored for `vendor`.
    pub fn fetch(&self, vendor: &str) -> Option<&str> {
        let prefix = vendor_prefix(vendor);
        self.0
            .iter()
            .find_map(|entry| entry.strip_prefix(prefix.as_str()))
    }

    /// Position of the entry of `vendor`, if the state has one.
    pub fn index(&self, vendor: &str) -> Option<usize> {
        let prefix = vendor_prefix(vendor);
        self.0.iter().position(|entry| entry.starts_with(&prefix))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the state has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the raw `vendor=value` entries, most recent first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

fn vendor_prefix(vendor: &str) -> String {
    format!("{}=", vendor)
}

impl fmt::Display for TraceState {
    /// Formats the state as a `tracestate` header value. An empty state
    /// formats as an empty string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(entry)?;
        }
        Ok(())
    }
}

impl FromStr for TraceState {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(TraceState::parse(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn short_entries(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("v{}=value{}", i, i)).collect()
    }

    fn long_entry(i: usize) -> String {
        format!("big{}={}", i, "x".repeat(ENTRY_LENGTH_THRESHOLD))
    }

    fn state_of(entries: &[String]) -> TraceState {
        TraceState(entries.to_vec())
    }

    #[rustfmt::skip]
    #[rstest]
    #[case("", &[])]
    #[case(",,,", &[])]
    #[case("in=1", &["in=1"])]
    #[case("in=1,,rojo=2,", &["in=1", "rojo=2"])]
    #[case("garbage", &["garbage"])]
    #[case("=x,in=", &["=x", "in="])]
    fn parse_drops_empty_items(#[case] header: &str, #[case] expected: &[&str]) {
        let state = TraceState::parse(header);
        assert_eq!(state.iter().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn parse_keeps_headers_under_the_cap() {
        let mut entries = short_entries(MAX_ENTRIES - 1);
        entries.push(long_entry(0));

        let state = TraceState::parse(&entries.join(","));
        assert_eq!(state, state_of(&entries));
    }

    #[test]
    fn parse_truncates_by_position_without_long_entries() {
        let entries = short_entries(MAX_ENTRIES + 8);

        let state = TraceState::parse(&entries.join(","));
        assert_eq!(state, state_of(&entries[..MAX_ENTRIES]));
    }

    #[test]
    fn parse_filters_leading_long_entries() {
        let mut entries = vec![long_entry(0), long_entry(1)];
        entries.extend(short_entries(MAX_ENTRIES));

        let state = TraceState::parse(&entries.join(","));
        assert_eq!(state, state_of(&entries[2..]));
    }

    #[test]
    fn parse_stops_filtering_once_the_rest_fits() {
        // 34 entries, long ones at 0, 5 and 10: dropping the first two is
        // enough, so the third one is kept
        let mut entries = short_entries(MAX_ENTRIES + 2);
        entries[0] = long_entry(0);
        entries[5] = long_entry(5);
        entries[10] = long_entry(10);

        let state = TraceState::parse(&entries.join(","));

        let mut expected = entries[1..5].to_vec();
        expected.extend_from_slice(&entries[6..]);
        assert_eq!(state.len(), MAX_ENTRIES);
        assert_eq!(state, state_of(&expected));
        assert_eq!(state.index("big10"), Some(8));
    }

    #[test]
    fn parse_drops_trailing_long_entry_by_position() {
        let mut entries = short_entries(MAX_ENTRIES);
        entries.push(long_entry(MAX_ENTRIES));

        let state = TraceState::parse(&entries.join(","));
        assert_eq!(state, state_of(&entries[..MAX_ENTRIES]));
    }

    #[test]
    fn round_trips_through_header() {
        for n in [0, 1, 2, 17, MAX_ENTRIES] {
            let mut entries = short_entries(n);
            if n > 2 {
                entries[1] = format!("big={}", "y".repeat(ENTRY_LENGTH_THRESHOLD));
            }
            let state = state_of(&entries);

            let header = state.to_string();
            assert_eq!(TraceState::parse(&header), state);
            assert_eq!(header.parse::<TraceState>(), Ok(state));
        }
    }

    #[test]
    fn empty_state_formats_as_empty_string() {
        assert_eq!(TraceState::default().to_string(), "");
        assert_eq!(TraceState::parse(",").to_string(), "");
    }

    #[test]
    fn add_prepends_and_replaces_vendor() {
        let state = TraceState::parse("rojo=1,in=old,congo=2");

        let state = state.add("in", "new");
        assert_eq!(state.to_string(), "in=new,rojo=1,congo=2");
        assert_eq!(state.fetch("in"), Some("new"));
        assert_eq!(state.iter().filter(|e| e.starts_with("in=")).count(), 1);
    }

    #[test]
    fn add_with_empty_vendor_is_noop() {
        let state = TraceState::parse("rojo=1");
        assert_eq!(state.add("", "data"), state);
    }

    #[test]
    fn add_never_exceeds_the_cap() {
        let full = state_of(&short_entries(MAX_ENTRIES));

        let state = full.add("in", "1");
        assert_eq!(state.len(), MAX_ENTRIES);
        assert_eq!(state.index("in"), Some(0));
        assert_eq!(state.fetch(&format!("v{}", MAX_ENTRIES - 1)), None);

        let mut state = TraceState::default();
        for i in 0..(MAX_ENTRIES * 2) {
            state = state.add(&format!("vendor{}", i), "x");
            assert!(state.len() <= MAX_ENTRIES);
        }
        assert_eq!(state.fetch(&format!("vendor{}", MAX_ENTRIES * 2 - 1)), Some("x"));
    }

    #[test]
    fn remove_filters_every_vendor_entry() {
        let state = TraceState::parse("in=1,rojo=2,in=3");

        assert_eq!(state.remove("in").to_string(), "rojo=2");
        assert_eq!(state.remove("unknown"), state);
        assert_eq!(state.remove(""), state);
    }

    #[test]
    fn fetch_and_index_match_on_vendor_prefix() {
        let state = TraceState::parse("inst=1,in=2,in=3");

        assert_eq!(state.fetch("in"), Some("2"));
        assert_eq!(state.index("in"), Some(1));
        assert_eq!(state.fetch("i"), None);
        assert_eq!(state.index("rojo"), None);
    }
}

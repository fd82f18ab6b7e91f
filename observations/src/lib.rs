//! Daily observations library.
//! Resolves a day's journal text from the data root (loose files, then yearly archives)
//! and turns it into categorized entries. Parsing is pure; disk access sits behind
//! the `storage` traits.

pub mod core {
    use indexmap::IndexMap;
    use serde::{Deserialize, Serialize};
    use std::path::PathBuf;

    /// Category that collects everything before the first recognized header.
    pub const DEFAULT_CATEGORY: &str = "none";

    /* ------------------------------- Entries ------------------------------- */

    /// One bullet: the bullet text followed by any wrapped/continuation lines.
    #[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct Entry(pub Vec<String>);

    impl Entry {
        pub fn new(first: impl Into<String>) -> Self {
            Self(vec![first.into()])
        }

        pub fn first_line(&self) -> &str {
            self.0.first().map(String::as_str).unwrap_or_default()
        }

        pub fn lines(&self) -> &[String] {
            &self.0
        }

        pub fn push_line(&mut self, line: impl Into<String>) {
            self.0.push(line.into());
        }

        /// All lines joined with `\n`.
        pub fn text(&self) -> String {
            self.0.join("\n")
        }
    }

    /// Ordered category → entries mapping produced by the parser.
    ///
    /// Once returned from `parse_observations` no category maps to an empty list.
    #[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ObservationSet(pub IndexMap<String, Vec<Entry>>);

    impl ObservationSet {
        pub fn new() -> Self {
            Self(IndexMap::new())
        }

        pub fn get(&self, category: &str) -> Option<&[Entry]> {
            self.0.get(category).map(Vec::as_slice)
        }

        pub fn contains(&self, category: &str) -> bool {
            self.0.contains_key(category)
        }

        /// Category labels in insertion order.
        pub fn categories(&self) -> Vec<&str> {
            self.0.keys().map(String::as_str).collect()
        }

        pub fn iter(&self) -> impl Iterator<Item = (&str, &[Entry])> {
            self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
        }

        pub fn len(&self) -> usize {
            self.0.len()
        }

        pub fn is_empty(&self) -> bool {
            self.0.is_empty()
        }
    }

    /* ------------------------------ Parse mode ------------------------------ */

    /// Header heuristic used to split a day into categories.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum ParseMode {
        /// `Header:` lines at a paragraph boundary.
        Colon,
        /// `#`-prefixed headings, nested by depth.
        Markdown,
    }

    impl ParseMode {
        pub fn for_file_name(name: &str) -> Self {
            if name.ends_with(".md") {
                Self::Markdown
            } else {
                Self::Colon
            }
        }
    }

    /* ------------------------------ Resolution ------------------------------ */

    /// Where a day's text was found.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(tag = "kind", rename_all = "snake_case")]
    pub enum SourceKind {
        LooseFile { path: PathBuf },
        ArchiveMember { archive: PathBuf, member: String },
    }

    /// Raw text of a day plus the candidate file name it matched.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct DayText {
        pub text: String,
        pub file_name: String,
        pub source: SourceKind,
    }

    impl DayText {
        /// Loose files pick the mode by extension; archive members are always colon-mode.
        pub fn mode(&self) -> ParseMode {
            match self.source {
                SourceKind::LooseFile { .. } => ParseMode::for_file_name(&self.file_name),
                SourceKind::ArchiveMember { .. } => ParseMode::Colon,
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Resolution {
        Found(DayText),
        NotFound,
    }

    /* ---------------------------- Errors (domain) ---------------------------- */

    #[derive(Debug, thiserror::Error)]
    pub enum ResolveError {
        #[error("month archive {member:?} nested inside {archive:?} is not supported")]
        NestedArchiveUnsupported { archive: PathBuf, member: String },
        #[error("reading {path:?}")]
        Read {
            path: PathBuf,
            #[source]
            source: std::io::Error,
        },
    }

    impl ResolveError {
        pub fn is_nested_archive(&self) -> bool {
            matches!(self, Self::NestedArchiveUnsupported { .. })
        }
    }
}

pub mod storage {
    use super::core::{Entry, Resolution, ResolveError};
    use anyhow::Result;
    use chrono::NaiveDate;

    /// Maps a calendar day to its raw journal text.
    pub trait DayStore {
        /// Missing content is `Ok(Resolution::NotFound)`, never an error.
        fn resolve(&self, date: NaiveDate) -> Result<Resolution, ResolveError>;
    }

    /// Narrow read/toggle interface over persisted favorite entries.
    pub trait FavoritesStore {
        fn is_favorite(&self, date: NaiveDate, entry: &Entry) -> bool;

        /// Flip the favorite state of `entry` and persist it. Returns the new state.
        fn toggle(&mut self, date: NaiveDate, entry: &Entry) -> Result<bool>;
    }
}

pub mod resolver {
    //! Filesystem-backed day lookup.
    //!
    //! Lookup order for a date:
    //! - `<root>/<YYYY-MM>/<YYYY-MM-DD>.txt`, then `.md`;
    //! - members of `<root>/<YYYY>.tgz`, in archive order.
    //!
    //! A month archive nested inside the year archive is reported as
    //! `ResolveError::NestedArchiveUnsupported` rather than unpacked.

    use crate::core::*;
    use crate::storage::DayStore;
    use chrono::NaiveDate;
    use flate2::read::GzDecoder;
    use std::{
        fs,
        io::Read,
        path::{Path, PathBuf},
    };
    use tracing::{debug, info, warn};

    /// Marker of macOS resource-fork members inside archives.
    const METADATA_MARKER: &str = "._";

    pub struct FsDayStore {
        root: PathBuf,
    }

    impl FsDayStore {
        pub fn new(root: impl Into<PathBuf>) -> Self {
            Self { root: root.into() }
        }

        pub fn loose_path(&self, date: NaiveDate, file_name: &str) -> PathBuf {
            self.root.join(year_month(date)).join(file_name)
        }

        pub fn archive_path(&self, date: NaiveDate) -> PathBuf {
            self.root.join(date.format("%Y.tgz").to_string())
        }
    }

    pub fn year_month(date: NaiveDate) -> String {
        date.format("%Y-%m").to_string()
    }

    /// File names a day may be stored under, in lookup order.
    pub fn candidate_file_names(date: NaiveDate) -> [String; 2] {
        [
            date.format("%Y-%m-%d.txt").to_string(),
            date.format("%Y-%m-%d.md").to_string(),
        ]
    }

    impl DayStore for FsDayStore {
        fn resolve(&self, date: NaiveDate) -> Result<Resolution, ResolveError> {
            let candidates = candidate_file_names(date);

            for name in &candidates {
                let path = self.loose_path(date, name);
                if !path.is_file() {
                    debug!(path = %path.display(), "loose file does not exist");
                    continue;
                }
                let bytes = fs::read(&path).map_err(|source| ResolveError::Read {
                    path: path.clone(),
                    source,
                })?;
                info!(path = %path.display(), "loaded loose file");
                return Ok(Resolution::Found(DayText {
                    text: decode_lossy(bytes),
                    file_name: name.clone(),
                    source: SourceKind::LooseFile { path },
                }));
            }

            let archive = self.archive_path(date);
            if !archive.is_file() {
                debug!(path = %archive.display(), "year archive does not exist");
                return Ok(Resolution::NotFound);
            }
            scan_year_archive(&archive, &year_month(date), &candidates)
        }
    }

    fn decode_lossy(bytes: Vec<u8>) -> String {
        match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
        }
    }

    fn scan_year_archive(
        archive_path: &Path,
        year_month: &str,
        candidates: &[String],
    ) -> Result<Resolution, ResolveError> {
        info!(path = %archive_path.display(), "scanning year archive");
        let file = match fs::File::open(archive_path) {
            Ok(file) => file,
            Err(err) => {
                warn!(path = %archive_path.display(), error = %err, "cannot open year archive");
                return Ok(Resolution::NotFound);
            }
        };
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        let entries = match archive.entries() {
            Ok(entries) => entries,
            Err(err) => {
                warn!(path = %archive_path.display(), error = %err, "cannot read year archive");
                return Ok(Resolution::NotFound);
            }
        };

        for entry in entries {
            let mut entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(path = %archive_path.display(), error = %err, "unreadable archive member");
                    return Ok(Resolution::NotFound);
                }
            };
            let member = match entry.path() {
                Ok(path) => path.to_string_lossy().into_owned(),
                Err(err) => {
                    warn!(error = %err, "archive member with invalid path");
                    continue;
                }
            };
            if member.contains(METADATA_MARKER) {
                continue;
            }

            if let Some(name) = candidates.iter().find(|c| member.ends_with(c.as_str())) {
                let mut bytes = Vec::new();
                if let Err(err) = entry.read_to_end(&mut bytes) {
                    warn!(%member, error = %err, "cannot extract archive member");
                    return Ok(Resolution::NotFound);
                }
                info!(%member, path = %archive_path.display(), "loaded archive member");
                return Ok(Resolution::Found(DayText {
                    text: decode_lossy(bytes),
                    file_name: name.clone(),
                    source: SourceKind::ArchiveMember {
                        archive: archive_path.to_path_buf(),
                        member,
                    },
                }));
            }

            if member.contains(year_month) && member.ends_with(".tgz") {
                warn!(%member, path = %archive_path.display(), "nested month archive");
                return Err(ResolveError::NestedArchiveUnsupported {
                    archive: archive_path.to_path_buf(),
                    member,
                });
            }
        }

        debug!(path = %archive_path.display(), "no matching archive member");
        Ok(Resolution::NotFound)
    }

}

pub mod parser {
    //! Line-oriented observation parser.
    //!
    //! One scan loop handles bullets and continuation lines for both modes; the mode only
    //! decides which lines open a category (`HeaderRule`). Header/bullet prefixes are
    //! recognized with `nom`. After the scan, empty, backfill-only and (unless asked for)
    //! noise categories are dropped.

    use crate::core::*;
    use indexmap::IndexMap;
    use nom::{
        IResult, bytes::complete::take_while1, combinator::map, error::VerboseError,
    };
    use tracing::debug;

    /// Joins nested markdown headings into one category label.
    pub const BREADCRUMB_SEPARATOR: &str = " -- ";

    /// Lowercase label fragments hidden unless `include_filtered` is set.
    pub const NOISE_MARKERS: [&str; 4] = [
        "memorable",
        "interesting people",
        "things i learned",
        "exercise",
    ];

    const BACKFILL_MARKER: &str = "backfill";

    /* ------------------------ Public entry points ------------------------ */

    /// Parse a day's text into categorized entries. Never fails; absent or empty text
    /// gives an empty set.
    pub fn parse_observations(
        text: Option<&str>,
        mode: ParseMode,
        include_filtered: bool,
    ) -> ObservationSet {
        let Some(text) = text.filter(|t| !t.is_empty()) else {
            return ObservationSet::new();
        };
        let scanned = match mode {
            ParseMode::Colon => scan(text, ColonHeaders),
            ParseMode::Markdown => scan(text, MarkdownHeadings::default()),
        };
        let set = prune(scanned, include_filtered);
        debug!(?mode, include_filtered, categories = set.len(), "parsed observations");
        set
    }

    /// Decides whether a line opens a new category.
    pub trait HeaderRule {
        /// `at_boundary` is true on the first content line and right after a blank line.
        fn header(&mut self, line: &str, at_boundary: bool) -> Option<String>;
    }

    /// `Header:` lines, only at a paragraph boundary.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct ColonHeaders;

    impl HeaderRule for ColonHeaders {
        fn header(&mut self, line: &str, at_boundary: bool) -> Option<String> {
            (at_boundary && line.ends_with(':') && !line.starts_with('-')).then(|| line.to_string())
        }
    }

    /// Running heading path for markdown mode.
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct CategoryTree(Vec<String>);

    impl CategoryTree {
        /// Enter a heading with `depth` leading `#`: keep `depth - 1` ancestors, push the
        /// heading, and return the new label.
        pub fn descend(&mut self, depth: usize, heading: &str) -> String {
            self.0.truncate(depth.saturating_sub(1));
            self.0.push(heading.to_string());
            self.label()
        }

        pub fn label(&self) -> String {
            self.0.join(BREADCRUMB_SEPARATOR)
        }
    }

    /// `#`-prefixed headings at any position.
    #[derive(Debug, Clone, Default)]
    pub struct MarkdownHeadings {
        tree: CategoryTree,
    }

    impl HeaderRule for MarkdownHeadings {
        fn header(&mut self, line: &str, _at_boundary: bool) -> Option<String> {
            let (depth, title) = markdown_heading(line)?;
            Some(self.tree.descend(depth, title))
        }
    }

    /* ------------------------------ Scanning ------------------------------ */

    /// Split `text` into categories using `rule`. The result still contains empty and
    /// filtered categories; see `prune`.
    pub fn scan<R: HeaderRule>(text: &str, mut rule: R) -> ObservationSet {
        let mut entries: IndexMap<String, Vec<Entry>> = IndexMap::new();
        entries.insert(DEFAULT_CATEGORY.to_string(), Vec::new());
        let mut current = 0;
        let mut first_line = true;
        let mut previous_blank = false;

        for line in text.split('\n') {
            let line = line.trim_end();
            if line.is_empty() {
                previous_blank = true;
                continue;
            }

            if let Some(category) = rule.header(line, first_line || previous_blank) {
                current = match entries.get_index_of(&category) {
                    Some(index) => index,
                    None => entries.insert_full(category, Vec::new()).0,
                };
                continue;
            }

            let bucket = &mut entries[current];
            if line.starts_with('-') {
                let text = bullet_text(line).unwrap_or_default();
                if text.is_empty() {
                    previous_blank = false;
                    continue;
                }
                bucket.push(Entry::new(text));
            } else {
                let text = line.trim_start();
                match bucket.last_mut() {
                    Some(entry) => entry.push_line(text),
                    None => bucket.push(Entry::new(text)),
                }
            }

            previous_blank = false;
            first_line = false;
        }

        ObservationSet(entries)
    }

    /// Drop empty, backfill-only and (unless `include_filtered`) noise categories.
    pub fn prune(set: ObservationSet, include_filtered: bool) -> ObservationSet {
        let mut entries = set.0;
        entries.retain(|category, list| {
            if list.is_empty() {
                return false;
            }
            if is_backfill_only(list) {
                debug!(%category, "dropping backfill-only category");
                return false;
            }
            include_filtered || !is_noise_category(category)
        });
        ObservationSet(entries)
    }

    pub fn is_noise_category(label: &str) -> bool {
        let lower = label.to_lowercase();
        NOISE_MARKERS.iter().any(|marker| lower.contains(marker))
    }

    fn is_backfill_only(list: &[Entry]) -> bool {
        matches!(list, [only] if only.first_line().to_lowercase().contains(BACKFILL_MARKER))
    }

    /* ------------------------------- Lexing ------------------------------- */

    type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

    fn heading_marks(i: &str) -> PResult<'_, usize> {
        map(take_while1(|c: char| c == '#'), |marks: &str| marks.len())(i)
    }

    fn bullet_marks(i: &str) -> PResult<'_, &str> {
        take_while1(|c: char| c == '-')(i)
    }

    /// `## Title` → `(2, "Title")`.
    fn markdown_heading(line: &str) -> Option<(usize, &str)> {
        let (rest, depth) = heading_marks(line).ok()?;
        Some((depth, rest.trim_start()))
    }

    /// `-- text ` → `text`.
    fn bullet_text(line: &str) -> Option<&str> {
        let (rest, _) = bullet_marks(line).ok()?;
        Some(rest.trim())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn lines(entry: &Entry) -> Vec<&str> {
            entry.lines().iter().map(String::as_str).collect()
        }

        #[test]
        fn continuation_lines_join_previous_bullet() {
            let set = parse_observations(
                Some("- First\n  more text\n- Second"),
                ParseMode::Colon,
                false,
            );

            assert_eq!(set.categories(), vec![DEFAULT_CATEGORY]);
            let entries = set.get(DEFAULT_CATEGORY).expect("default category");
            assert_eq!(entries.len(), 2);
            assert_eq!(lines(&entries[0]), vec!["First", "more text"]);
            assert_eq!(lines(&entries[1]), vec!["Second"]);
        }

        #[test]
        fn colon_header_only_at_boundary() {
            let text = "Morning:\n- coffee\nthen I said:\n- tea\n\nEvening:\n- read";
            let set = parse_observations(Some(text), ParseMode::Colon, false);

            assert_eq!(set.categories(), vec!["Morning:", "Evening:"]);
            let morning = set.get("Morning:").expect("morning");
            assert_eq!(lines(&morning[0]), vec!["coffee", "then I said:"]);
            assert_eq!(lines(&morning[1]), vec!["tea"]);
            assert_eq!(lines(&set.get("Evening:").expect("evening")[0]), vec!["read"]);
        }

        #[test]
        fn dash_lines_are_never_colon_headers() {
            let set = parse_observations(Some("- todo:\n"), ParseMode::Colon, false);
            assert_eq!(lines(&set.get(DEFAULT_CATEGORY).expect("none")[0]), vec!["todo:"]);
        }

        #[test]
        fn content_before_first_header_lands_in_default_category() {
            let text = "woke up late\n\nWork:\n- shipped it";
            let set = parse_observations(Some(text), ParseMode::Colon, false);

            assert_eq!(set.categories(), vec![DEFAULT_CATEGORY, "Work:"]);
            assert_eq!(
                lines(&set.get(DEFAULT_CATEGORY).expect("none")[0]),
                vec!["woke up late"]
            );
        }

        #[test]
        fn bare_dash_adds_nothing() {
            let text = "Notes:\n-\n- kept";
            let set = parse_observations(Some(text), ParseMode::Colon, false);
            let notes = set.get("Notes:").expect("notes");
            assert_eq!(notes.len(), 1);
            assert_eq!(lines(&notes[0]), vec!["kept"]);
        }

        #[test]
        fn repeated_header_appends_to_existing_category() {
            let text = "A:\n- one\n\nB:\n- two\n\nA:\n- three";
            let set = parse_observations(Some(text), ParseMode::Colon, false);

            assert_eq!(set.categories(), vec!["A:", "B:"]);
            assert_eq!(set.get("A:").expect("a").len(), 2);
        }

        #[test]
        fn markdown_depth_rebuilds_breadcrumbs() {
            let text = "# A\n- a\n## B\n- b\n# C\n- c";
            let set = parse_observations(Some(text), ParseMode::Markdown, false);

            assert_eq!(set.categories(), vec!["A", "A -- B", "C"]);
        }

        #[test]
        fn markdown_headings_ignore_blank_line_boundaries() {
            let text = "# Day\n- up early\n## Morning\n- run\nstill running";
            let set = parse_observations(Some(text), ParseMode::Markdown, false);

            let morning = set.get("Day -- Morning").expect("nested heading");
            assert_eq!(lines(&morning[0]), vec!["run", "still running"]);
        }

        #[test]
        fn markdown_heading_strips_unicode_whitespace() {
            let text = "#\u{a0}Title\n- a\n##\u{2003} Sub\n- b";
            let set = parse_observations(Some(text), ParseMode::Markdown, false);
            assert_eq!(set.categories(), vec!["Title", "Title -- Sub"]);
        }

        #[test]
        fn markdown_mode_does_not_treat_colons_as_headers() {
            let text = "Notes:\n- a";
            let set = parse_observations(Some(text), ParseMode::Markdown, false);
            assert_eq!(set.categories(), vec![DEFAULT_CATEGORY]);
        }

        #[test]
        fn category_tree_truncates_to_parent_depth() {
            let mut tree = CategoryTree::default();
            assert_eq!(tree.descend(1, "Trip"), "Trip");
            assert_eq!(tree.descend(3, "Deep"), "Trip -- Deep");
            assert_eq!(tree.descend(2, "Food"), "Trip -- Food");
            assert_eq!(tree.label(), "Trip -- Food");
        }

        #[test]
        fn single_backfill_entry_is_dropped() {
            let text = "Work:\n- BACKFILL from notes\n\nHome:\n- Backfill\n- real entry";
            let set = parse_observations(Some(text), ParseMode::Colon, false);

            assert!(!set.contains("Work:"));
            assert_eq!(set.get("Home:").expect("home").len(), 2);
        }

        #[test]
        fn noise_categories_hidden_unless_requested() {
            let text = "Exercise:\n- 5k run\n\nWork:\n- meetings";

            let hidden = parse_observations(Some(text), ParseMode::Colon, false);
            assert_eq!(hidden.categories(), vec!["Work:"]);

            let shown = parse_observations(Some(text), ParseMode::Colon, true);
            assert_eq!(shown.categories(), vec!["Exercise:", "Work:"]);
            assert_eq!(lines(&shown.get("Exercise:").expect("exercise")[0]), vec!["5k run"]);
        }

        #[test]
        fn noise_match_uses_full_breadcrumb() {
            let text = "# Trip\n- flew out\n## Memorable Moments\n- sunset";
            let set = parse_observations(Some(text), ParseMode::Markdown, false);
            assert_eq!(set.categories(), vec!["Trip"]);

            assert!(is_noise_category("Things I Learned:"));
            assert!(is_noise_category("Interesting People"));
            assert!(!is_noise_category("Work:"));
        }

        #[test]
        fn absent_or_empty_text_gives_empty_set() {
            assert!(parse_observations(None, ParseMode::Colon, true).is_empty());
            assert!(parse_observations(Some(""), ParseMode::Markdown, true).is_empty());
            assert!(parse_observations(Some("\n\n  \n"), ParseMode::Colon, true).is_empty());
        }

        #[test]
        fn parsing_is_deterministic() {
            let text = "Morning:\n- a\n  b\n\n# x\nEvening:\n- c\r\n";
            let first = parse_observations(Some(text), ParseMode::Colon, true);
            let second = parse_observations(Some(text), ParseMode::Colon, true);
            assert_eq!(first, second);
            assert_eq!(first.categories(), vec!["Morning:"]);
        }

        #[test]
        fn trailing_whitespace_and_crlf_are_stripped() {
            let set = parse_observations(Some("Log:  \r\n- item  \r\n"), ParseMode::Colon, false);
            assert_eq!(lines(&set.get("Log:").expect("log")[0]), vec!["item"]);
        }
    }
}

pub mod history {
    //! Date selection: today, a random journal day, and the same day in earlier years.

    use chrono::{Days, Local, Months, NaiveDate};
    use rand::Rng;

    /// First day of the journal. Days on or before it are never shown.
    pub const EPOCH: NaiveDate = match NaiveDate::from_ymd_opt(2012, 11, 16) {
        Some(date) => date,
        None => panic!("invalid journal epoch"),
    };

    pub fn today() -> NaiveDate {
        Local::now().date_naive()
    }

    /// `date`, followed by the same day of each earlier year when `walk_back` is set.
    /// Stops once a date is no longer after `EPOCH`; Feb 29 steps back to Feb 28.
    pub fn history_dates(date: NaiveDate, walk_back: bool) -> Vec<NaiveDate> {
        let mut out = Vec::new();
        let mut current = Some(date);
        while let Some(day) = current.filter(|d| *d > EPOCH) {
            out.push(day);
            if !walk_back {
                break;
            }
            current = day.checked_sub_months(Months::new(12));
        }
        out
    }

    /// Uniformly chosen day in `EPOCH..=today`.
    pub fn random_date<R: Rng + ?Sized>(rng: &mut R, today: NaiveDate) -> NaiveDate {
        let span = (today - EPOCH).num_days().max(0);
        let offset = rng.gen_range(0..=span) as u64;
        EPOCH + Days::new(offset)
    }

    pub fn days_ago(date: NaiveDate, today: NaiveDate) -> i64 {
        (today - date).num_days()
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use rand::{SeedableRng, rngs::StdRng};

        fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
            NaiveDate::from_ymd_opt(y, m, d).unwrap()
        }

        #[test]
        fn single_day_without_walk_back() {
            assert_eq!(history_dates(ymd(2020, 3, 1), false), vec![ymd(2020, 3, 1)]);
        }

        #[test]
        fn walk_back_stops_at_epoch() {
            let dates = history_dates(ymd(2015, 11, 16), true);
            assert_eq!(
                dates,
                vec![ymd(2015, 11, 16), ymd(2014, 11, 16), ymd(2013, 11, 16)]
            );
        }

        #[test]
        fn leap_day_steps_back_to_feb_28() {
            let dates = history_dates(ymd(2016, 2, 29), true);
            assert_eq!(&dates[..2], &[ymd(2016, 2, 29), ymd(2015, 2, 28)]);
        }

        #[test]
        fn dates_on_or_before_epoch_are_empty() {
            assert!(history_dates(EPOCH, true).is_empty());
            assert!(history_dates(ymd(2010, 1, 1), false).is_empty());
        }

        #[test]
        fn random_date_stays_in_range() {
            let mut rng = StdRng::seed_from_u64(7);
            let today = ymd(2024, 6, 1);
            for _ in 0..200 {
                let date = random_date(&mut rng, today);
                assert!(date >= EPOCH && date <= today, "{date} out of range");
            }
            assert_eq!(random_date(&mut rng, EPOCH), EPOCH);
        }

        #[test]
        fn days_ago_counts_calendar_days() {
            assert_eq!(days_ago(ymd(2024, 1, 1), ymd(2024, 1, 31)), 30);
        }
    }
}

pub mod favorites {
    //! YAML-backed favorites: `YYYY-MM-DD` → { entry hash → entry text }.

    use crate::core::Entry;
    use crate::storage::FavoritesStore;
    use anyhow::Result;
    use chrono::NaiveDate;
    use sha2::{Digest, Sha256};
    use std::{
        collections::BTreeMap,
        fs, io,
        path::{Path, PathBuf},
    };
    use tracing::{debug, info};

    pub type FavoriteMap = BTreeMap<String, BTreeMap<String, String>>;

    #[derive(Debug, thiserror::Error)]
    pub enum FavoritesError {
        #[error("reading favorites {path:?}")]
        Read {
            path: PathBuf,
            #[source]
            source: io::Error,
        },
        #[error("writing favorites {path:?}")]
        Write {
            path: PathBuf,
            #[source]
            source: io::Error,
        },
        #[error("malformed favorites {path:?}")]
        Yaml {
            path: PathBuf,
            #[source]
            source: serde_yml::Error,
        },
    }

    /// Stable key of an entry: hex SHA-256 over its lines joined with `\n`.
    pub fn entry_hash(entry: &Entry) -> String {
        format!("{:x}", Sha256::digest(entry.text().as_bytes()))
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct YamlFavorites {
        path: PathBuf,
        favorites: FavoriteMap,
    }

    impl YamlFavorites {
        /// Load from `path`; a missing or empty file is an empty store.
        pub fn load(path: impl Into<PathBuf>) -> Result<Self, FavoritesError> {
            let path = path.into();
            if !path.exists() {
                debug!(path = %path.display(), "no favorites file yet");
                return Ok(Self {
                    path,
                    favorites: FavoriteMap::new(),
                });
            }
            let text = fs::read_to_string(&path).map_err(|source| FavoritesError::Read {
                path: path.clone(),
                source,
            })?;
            let favorites = if text.trim().is_empty() {
                FavoriteMap::new()
            } else {
                serde_yml::from_str::<Option<FavoriteMap>>(&text)
                    .map_err(|source| FavoritesError::Yaml {
                        path: path.clone(),
                        source,
                    })?
                    .unwrap_or_default()
            };
            Ok(Self { path, favorites })
        }

        pub fn path(&self) -> &Path {
            &self.path
        }

        pub fn all(&self) -> &FavoriteMap {
            &self.favorites
        }

        pub fn for_date(&self, date: NaiveDate) -> Option<&BTreeMap<String, String>> {
            self.favorites.get(&date.to_string())
        }

        fn save(&self) -> Result<(), FavoritesError> {
            let text = serde_yml::to_string(&self.favorites).map_err(|source| {
                FavoritesError::Yaml {
                    path: self.path.clone(),
                    source,
                }
            })?;
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|source| FavoritesError::Write {
                    path: self.path.clone(),
                    source,
                })?;
            }
            fs::write(&self.path, text).map_err(|source| FavoritesError::Write {
                path: self.path.clone(),
                source,
            })
        }
    }

    impl FavoritesStore for YamlFavorites {
        fn is_favorite(&self, date: NaiveDate, entry: &Entry) -> bool {
            self.for_date(date)
                .is_some_and(|day| day.contains_key(&entry_hash(entry)))
        }

        fn toggle(&mut self, date: NaiveDate, entry: &Entry) -> Result<bool> {
            let key = date.to_string();
            let hash = entry_hash(entry);
            let day = self.favorites.entry(key.clone()).or_default();
            let now_favorite = if day.remove(&hash).is_some() {
                if day.is_empty() {
                    self.favorites.remove(&key);
                }
                false
            } else {
                day.insert(hash, entry.text());
                true
            };
            self.save()?;
            info!(%date, now_favorite, "toggled favorite");
            Ok(now_favorite)
        }
    }

}

pub mod journal {
    //! Resolve + parse composed per day, the unit the CLI renders.

    use crate::core::*;
    use crate::parser::parse_observations;
    use crate::storage::DayStore;
    use chrono::NaiveDate;
    use serde::Serialize;
    use tracing::warn;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
    pub struct DayView {
        pub date: NaiveDate,
        pub observations: ObservationSet,
        pub categories: Vec<String>,
        pub source: Option<SourceKind>,
    }

    impl DayView {
        /// A day with nothing recorded.
        pub fn empty(date: NaiveDate) -> Self {
            Self {
                date,
                observations: ObservationSet::new(),
                categories: Vec::new(),
                source: None,
            }
        }
    }

    /// Load and parse one day. A nested month archive is logged and shown as an empty day;
    /// other resolver errors are returned.
    pub fn load_day<S: DayStore + ?Sized>(
        store: &S,
        date: NaiveDate,
        include_filtered: bool,
    ) -> Result<DayView, ResolveError> {
        let resolution = match store.resolve(date) {
            Ok(resolution) => resolution,
            Err(err) if err.is_nested_archive() => {
                warn!(%date, error = %err, "showing empty day");
                Resolution::NotFound
            }
            Err(err) => return Err(err),
        };

        let day = match resolution {
            Resolution::Found(day) => day,
            Resolution::NotFound => return Ok(DayView::empty(date)),
        };
        let observations =
            parse_observations(Some(day.text.as_str()), day.mode(), include_filtered);
        let categories = observations
            .categories()
            .into_iter()
            .map(str::to_string)
            .collect();

        Ok(DayView {
            date,
            observations,
            categories,
            source: Some(day.source),
        })
    }

    pub fn load_days<S: DayStore + ?Sized>(
        store: &S,
        dates: impl IntoIterator<Item = NaiveDate>,
        include_filtered: bool,
    ) -> Result<Vec<DayView>, ResolveError> {
        dates
            .into_iter()
            .map(|date| load_day(store, date, include_filtered))
            .collect()
    }

}

pub use journal::{DayView, load_day, load_days};
pub use parser::parse_observations;
pub use resolver::FsDayStore;

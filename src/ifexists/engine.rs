//! Key-based filtering of an input stream against a filter stream.
//!
//! Every input row is classified as accepted or rejected by testing its key
//! against the filter's keys (inverted for `ifnotexists`). Filter rows may be
//! partitioned into matched and unmatched, and matching pairs may be merged
//! into a joined output. One of four strategies does the work; see
//! [`Strategy`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Read;

use tracing::{debug, info, warn};

use crate::common::ColumnSelector;
use crate::error::{KgtkError, Result};
use crate::format::{LIST_SEPARATOR, Schema};
use crate::key::{ImplicitKey, KeySpec, check_key_counts, resolve_key_columns};
use crate::merge::JoinLayout;
use crate::reader::{KgtkReader, Row};
use crate::writer::RowSink;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// Load the filter keys, stream the input. Preserves input order.
    CacheFilter,
    /// Load the input grouped by key, stream the filter. Output is in key order.
    CacheInputUnordered,
    /// Load the input keys and rows, stream the filter, replay the input in order.
    CacheInputOrdered,
    /// Merge two streams sorted by key.
    PresortedMerge,
}

#[derive(Clone, Debug)]
pub struct FilterConfig {
    /// Accept input rows whose key is absent from the filter.
    pub invert: bool,
    /// Joined output keeps input rows without a filter match.
    pub left_join: bool,
    /// Joined output keeps filter rows without an input match.
    pub right_join: bool,
    pub cache_input: bool,
    pub preserve_order: bool,
    pub presorted: bool,
    /// Merge the filter columns first in the joined output.
    pub right_first: bool,
    pub field_separator: String,
    pub input_prefix: Option<String>,
    pub filter_prefix: Option<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            invert: false,
            left_join: false,
            right_join: false,
            cache_input: false,
            preserve_order: false,
            presorted: false,
            right_first: false,
            field_separator: LIST_SEPARATOR.to_string(),
            input_prefix: None,
            filter_prefix: None,
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.field_separator.is_empty() {
            return Err(KgtkError::config("field separator must not be empty"));
        }
        Ok(())
    }

    /// `presorted` wins over `cache_input`; `preserve_order` only refines `cache_input`.
    pub fn strategy(&self) -> Strategy {
        if self.presorted {
            Strategy::PresortedMerge
        } else if self.cache_input && self.preserve_order {
            Strategy::CacheInputOrdered
        } else if self.cache_input {
            Strategy::CacheInputUnordered
        } else {
            Strategy::CacheFilter
        }
    }

    pub fn join_layout(&self, input: &Schema, filter: &Schema) -> Result<JoinLayout> {
        JoinLayout::new(
            input,
            filter,
            self.input_prefix.as_deref(),
            self.filter_prefix.as_deref(),
            self.right_first,
        )
    }
}

/// A row source together with its resolved key.
pub struct FilterSide<R: Read> {
    pub reader: KgtkReader<R>,
    pub key: KeySpec,
}

impl<R: Read> FilterSide<R> {
    pub fn new(
        reader: KgtkReader<R>,
        selectors: &[ColumnSelector],
        implicit: ImplicitKey,
        separator: &str,
    ) -> Result<Self> {
        let columns = resolve_key_columns(reader.schema(), reader.label(), selectors, implicit)?;
        Ok(FilterSide {
            reader,
            key: KeySpec::new(columns, separator),
        })
    }

    pub fn schema(&self) -> &Schema {
        self.reader.schema()
    }
}

pub struct JoinedOutput<'a> {
    pub sink: &'a mut dyn RowSink,
    pub layout: JoinLayout,
}

#[derive(Default)]
pub struct FilterOutputs<'a> {
    pub accepted: Option<&'a mut dyn RowSink>,
    pub rejected: Option<&'a mut dyn RowSink>,
    pub matched_filter: Option<&'a mut dyn RowSink>,
    pub unmatched_filter: Option<&'a mut dyn RowSink>,
    pub joined: Option<JoinedOutput<'a>>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FilterCounts {
    pub accepted: u64,
    pub rejected: u64,
    pub matched_filter: u64,
    pub unmatched_filter: u64,
    pub joined: u64,
}

/// Runs the strategy selected by `config` to completion.
pub fn process<I: Read, F: Read>(
    config: &FilterConfig,
    input: FilterSide<I>,
    filter: FilterSide<F>,
    outputs: FilterOutputs<'_>,
) -> Result<FilterCounts> {
    config.validate()?;
    check_key_counts(&input.key, &filter.key)?;

    if config.preserve_order && !config.cache_input && !config.presorted {
        warn!("preserve-order has no effect without cache-input");
    }
    if config.presorted && config.cache_input {
        info!("presorted inputs take precedence over cache-input");
    }

    let strategy = config.strategy();
    info!(
        ?strategy,
        input = input.reader.label(),
        filter = filter.reader.label(),
        invert = config.invert,
        "filtering"
    );

    let mut emit = Emitter {
        outputs,
        counts: FilterCounts::default(),
        invert: config.invert,
        left_join: config.left_join,
        right_join: config.right_join,
    };
    match strategy {
        Strategy::CacheFilter => cache_filter(input, filter, &mut emit)?,
        Strategy::CacheInputUnordered => cache_input_unordered(input, filter, &mut emit)?,
        Strategy::CacheInputOrdered => cache_input_ordered(input, filter, &mut emit)?,
        Strategy::PresortedMerge => presorted_merge(input, filter, config.right_first, &mut emit)?,
    }

    let counts = emit.counts;
    info!(
        accepted = counts.accepted,
        rejected = counts.rejected,
        matched_filter = counts.matched_filter,
        unmatched_filter = counts.unmatched_filter,
        joined = counts.joined,
        "filter complete"
    );
    Ok(counts)
}

/// Routes classified rows to whichever outputs were requested.
struct Emitter<'a> {
    outputs: FilterOutputs<'a>,
    counts: FilterCounts,
    invert: bool,
    left_join: bool,
    right_join: bool,
}

impl Emitter<'_> {
    fn input_row(&mut self, row: &[String], matched: bool) -> Result<()> {
        if matched != self.invert {
            self.counts.accepted += 1;
            write_to(&mut self.outputs.accepted, row)
        } else {
            self.counts.rejected += 1;
            write_to(&mut self.outputs.rejected, row)
        }
    }

    fn filter_row(&mut self, row: &[String], matched: bool) -> Result<()> {
        if matched {
            self.counts.matched_filter += 1;
            write_to(&mut self.outputs.matched_filter, row)
        } else {
            self.counts.unmatched_filter += 1;
            write_to(&mut self.outputs.unmatched_filter, row)
        }
    }

    fn join_pair(&mut self, input: &[String], filter: &[String]) -> Result<()> {
        self.joined(Some(input), Some(filter))
    }

    fn input_unmatched(&mut self, row: &[String]) -> Result<()> {
        if self.left_join {
            self.joined(Some(row), None)?;
        }
        Ok(())
    }

    fn filter_unmatched(&mut self, row: &[String]) -> Result<()> {
        self.filter_row(row, false)?;
        if self.right_join {
            self.joined(None, Some(row))?;
        }
        Ok(())
    }

    fn joined(&mut self, input: Option<&[String]>, filter: Option<&[String]>) -> Result<()> {
        if let Some(joined) = self.outputs.joined.as_mut() {
            let row = joined.layout.merge_rows(input, filter);
            joined.sink.write(&row, None)?;
            self.counts.joined += 1;
        }
        Ok(())
    }

    fn wants_join(&self) -> bool {
        self.outputs.joined.is_some()
    }

    /// Whether filter rows must be seen after the input is exhausted.
    fn wants_filter_rows(&self) -> bool {
        self.outputs.matched_filter.is_some()
            || self.outputs.unmatched_filter.is_some()
            || (self.right_join && self.wants_join())
    }
}

fn write_to(sink: &mut Option<&mut dyn RowSink>, row: &[String]) -> Result<()> {
    match sink {
        Some(sink) => sink.write(row, None),
        None => Ok(()),
    }
}

fn cache_filter<I: Read, F: Read>(
    input: FilterSide<I>,
    filter: FilterSide<F>,
    emit: &mut Emitter<'_>,
) -> Result<()> {
    let keep_rows = emit.wants_join() || emit.wants_filter_rows();

    // Key -> positions in `filter_rows`; the lists stay empty unless rows are kept.
    let mut filter_keys: HashMap<String, Vec<usize>> = HashMap::new();
    let mut filter_rows: Vec<Row> = Vec::new();
    let mut unmatched_keys: HashSet<String> = HashSet::new();
    for row in filter.reader {
        let row = row?;
        let key = filter.key.key(&row)?.into_owned();
        let positions = filter_keys.entry(key.clone()).or_default();
        if keep_rows {
            positions.push(filter_rows.len());
            filter_rows.push(row);
            unmatched_keys.insert(key);
        }
    }
    debug!(
        keys = filter_keys.len(),
        rows = filter_rows.len(),
        "cached filter"
    );

    for row in input.reader {
        let row = row?;
        let key = input.key.key(&row)?;
        match filter_keys.get(key.as_ref()) {
            Some(positions) => {
                emit.input_row(&row, true)?;
                unmatched_keys.remove(key.as_ref());
                if emit.wants_join() {
                    for &pos in positions {
                        emit.join_pair(&row, &filter_rows[pos])?;
                    }
                }
            }
            None => {
                emit.input_row(&row, false)?;
                emit.input_unmatched(&row)?;
            }
        }
    }

    if emit.wants_filter_rows() {
        for row in &filter_rows {
            let key = filter.key.key(row)?;
            if unmatched_keys.contains(key.as_ref()) {
                emit.filter_unmatched(row)?;
            } else {
                emit.filter_row(row, true)?;
            }
        }
    }
    Ok(())
}

/// Input rows held in memory while the filter streams past.
trait InputCache {
    fn contains(&self, key: &str) -> bool;

    fn for_each_match(
        &self,
        key: &str,
        f: &mut dyn FnMut(&[String]) -> Result<()>,
    ) -> Result<()>;
}

impl InputCache for BTreeMap<String, Vec<Row>> {
    fn contains(&self, key: &str) -> bool {
        self.contains_key(key)
    }

    fn for_each_match(
        &self,
        key: &str,
        f: &mut dyn FnMut(&[String]) -> Result<()>,
    ) -> Result<()> {
        for row in self.get(key).into_iter().flatten() {
            f(row.as_slice())?;
        }
        Ok(())
    }
}

struct OrderedInput {
    rows: Vec<Row>,
    keys: HashSet<String>,
    /// Key -> row positions, only built when a joined output is requested.
    positions: Option<HashMap<String, Vec<usize>>>,
}

impl InputCache for OrderedInput {
    fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    fn for_each_match(
        &self,
        key: &str,
        f: &mut dyn FnMut(&[String]) -> Result<()>,
    ) -> Result<()> {
        let matches = self.positions.as_ref().and_then(|map| map.get(key));
        for &pos in matches.into_iter().flatten() {
            f(self.rows[pos].as_slice())?;
        }
        Ok(())
    }
}

/// Streams the filter against cached input keys and returns the set of
/// input keys whose rows are accepted.
fn scan_filter<F: Read>(
    filter: FilterSide<F>,
    cache: &impl InputCache,
    mut accepted: HashSet<String>,
    emit: &mut Emitter<'_>,
) -> Result<HashSet<String>> {
    for row in filter.reader {
        let row = row?;
        let key = filter.key.key(&row)?;
        if !cache.contains(&key) {
            emit.filter_unmatched(&row)?;
            continue;
        }
        emit.filter_row(&row, true)?;
        if emit.invert {
            accepted.remove(key.as_ref());
        } else if !accepted.contains(key.as_ref()) {
            accepted.insert(key.to_string());
        }
        if emit.wants_join() {
            cache.for_each_match(&key, &mut |input_row: &[String]| {
                emit.join_pair(input_row, &row)
            })?;
        }
    }
    Ok(accepted)
}

fn cache_input_unordered<I: Read, F: Read>(
    input: FilterSide<I>,
    filter: FilterSide<F>,
    emit: &mut Emitter<'_>,
) -> Result<()> {
    let mut groups: BTreeMap<String, Vec<Row>> = BTreeMap::new();
    for row in input.reader {
        let row = row?;
        let key = input.key.key(&row)?.into_owned();
        groups.entry(key).or_default().push(row);
    }
    debug!(keys = groups.len(), "cached input by key");

    let seed = if emit.invert {
        groups.keys().cloned().collect()
    } else {
        HashSet::new()
    };
    let accepted = scan_filter(filter, &groups, seed, emit)?;

    for (key, rows) in &groups {
        let matched = accepted.contains(key) != emit.invert;
        for row in rows {
            emit.input_row(row, matched)?;
            if !matched {
                emit.input_unmatched(row)?;
            }
        }
    }
    Ok(())
}

fn cache_input_ordered<I: Read, F: Read>(
    input: FilterSide<I>,
    filter: FilterSide<F>,
    emit: &mut Emitter<'_>,
) -> Result<()> {
    let mut cache = OrderedInput {
        rows: Vec::new(),
        keys: HashSet::new(),
        positions: emit.wants_join().then(HashMap::new),
    };
    for row in input.reader {
        let row = row?;
        let key = input.key.key(&row)?.into_owned();
        if let Some(positions) = cache.positions.as_mut() {
            positions.entry(key.clone()).or_default().push(cache.rows.len());
        }
        cache.keys.insert(key);
        cache.rows.push(row);
    }
    debug!(
        keys = cache.keys.len(),
        rows = cache.rows.len(),
        "cached input in order"
    );

    let seed = if emit.invert {
        cache.keys.clone()
    } else {
        HashSet::new()
    };
    let accepted = scan_filter(filter, &cache, seed, emit)?;

    for row in &cache.rows {
        let key = input.key.key(row)?;
        let matched = accepted.contains(key.as_ref()) != emit.invert;
        emit.input_row(row, matched)?;
        if !matched {
            emit.input_unmatched(row)?;
        }
    }
    Ok(())
}

/// One side of a merge, checked for ascending key order as it is read.
struct SortedStream<R: Read> {
    side: FilterSide<R>,
    previous: Option<String>,
}

impl<R: Read> SortedStream<R> {
    fn new(side: FilterSide<R>) -> Self {
        SortedStream {
            side,
            previous: None,
        }
    }

    fn next_keyed(&mut self) -> Result<Option<(String, Row)>> {
        let Some(row) = self.side.reader.next().transpose()? else {
            return Ok(None);
        };
        let key = self.side.key.key(&row)?.into_owned();
        if let Some(previous) = self.previous.as_ref() {
            if key < *previous {
                return Err(KgtkError::OutOfOrder {
                    file: self.side.reader.label().to_string(),
                    line: self.side.reader.line(),
                    key,
                    previous: previous.clone(),
                });
            }
        }
        self.previous = Some(key.clone());
        Ok(Some((key, row)))
    }
}

/// Filter rows sharing one key.
struct FilterGroup {
    key: String,
    rows: Vec<Row>,
    matched: bool,
}

struct GroupedStream<R: Read> {
    stream: SortedStream<R>,
    pending: Option<(String, Row)>,
}

impl<R: Read> GroupedStream<R> {
    fn next_group(&mut self) -> Result<Option<FilterGroup>> {
        let first = match self.pending.take() {
            Some(pending) => Some(pending),
            None => self.stream.next_keyed()?,
        };
        let Some((key, row)) = first else {
            return Ok(None);
        };
        let mut rows = vec![row];
        loop {
            match self.stream.next_keyed()? {
                Some((next_key, next_row)) if next_key == key => rows.push(next_row),
                other => {
                    self.pending = other;
                    break;
                }
            }
        }
        Ok(Some(FilterGroup {
            key,
            rows,
            matched: false,
        }))
    }
}

fn finish_group(group: FilterGroup, emit: &mut Emitter<'_>) -> Result<()> {
    if !group.matched {
        for row in &group.rows {
            emit.filter_unmatched(row)?;
        }
    }
    Ok(())
}

fn emit_matched_group(group: &FilterGroup, emit: &mut Emitter<'_>) -> Result<()> {
    for row in &group.rows {
        emit.filter_row(row, true)?;
    }
    Ok(())
}

fn presorted_merge<I: Read, F: Read>(
    input: FilterSide<I>,
    filter: FilterSide<F>,
    right_first: bool,
    emit: &mut Emitter<'_>,
) -> Result<()> {
    let mut inputs = SortedStream::new(input);
    let mut filters = GroupedStream {
        stream: SortedStream::new(filter),
        pending: None,
    };
    let mut group = filters.next_group()?;

    while let Some((key, row)) = inputs.next_keyed()? {
        while group.as_ref().is_some_and(|g| g.key < key) {
            if let Some(done) = group.take() {
                finish_group(done, emit)?;
            }
            group = filters.next_group()?;
        }

        match group.as_mut() {
            Some(current) if current.key == key => {
                let first_match = !current.matched;
                current.matched = true;
                if first_match && right_first {
                    emit_matched_group(current, emit)?;
                }
                emit.input_row(&row, true)?;
                if first_match && !right_first {
                    emit_matched_group(current, emit)?;
                }
                if emit.wants_join() {
                    for filter_row in &current.rows {
                        emit.join_pair(&row, filter_row)?;
                    }
                }
            }
            _ => {
                emit.input_row(&row, false)?;
                emit.input_unmatched(&row)?;
            }
        }
    }

    if let Some(done) = group.take() {
        finish_group(done, emit)?;
    }
    if emit.wants_filter_rows() {
        while let Some(done) = filters.next_group()? {
            finish_group(done, emit)?;
        }
    }
    Ok(())
}

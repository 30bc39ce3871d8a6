use crate::island::IslandId;
use crate::message::Hyperparameters;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub cycle: u64,
    pub island: IslandId,
    pub fitness: i64,
    pub best_fitness_so_far: i64,
    pub hyperparameters: Hyperparameters,
}

/// Append-only log of processed results, indexed per island.
///
/// Rows must be appended with non-decreasing cycles; cycle lookups rely on it.
#[derive(Debug, Default)]
pub struct ResultStore {
    rows: Vec<ResultRow>,
    by_island: HashMap<IslandId, Vec<usize>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, row: ResultRow) {
        debug_assert!(self.rows.last().map_or(true, |last| last.cycle <= row.cycle));
        self.by_island
            .entry(row.island.clone())
            .or_default()
            .push(self.rows.len());
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    /// All rows of `island` in insertion order.
    pub fn for_island<'a>(&'a self, island: &IslandId) -> impl Iterator<Item = &'a ResultRow> + 'a {
        self.island_positions(island)
            .iter()
            .map(move |&position| &self.rows[position])
    }

    /// Up to `count` most recent rows of `island`, newest first.
    pub fn recent<'a>(
        &'a self,
        island: &IslandId,
        count: usize,
    ) -> impl Iterator<Item = &'a ResultRow> + 'a {
        self.island_positions(island)
            .iter()
            .rev()
            .take(count)
            .map(move |&position| &self.rows[position])
    }

    pub fn in_cycle(&self, cycle: u64) -> &[ResultRow] {
        let start = self.rows.partition_point(|row| row.cycle < cycle);
        let end = self.rows.partition_point(|row| row.cycle <= cycle);
        &self.rows[start..end]
    }

    pub fn best_in_cycle(&self, cycle: u64) -> Option<i64> {
        self.in_cycle(cycle).iter().map(|row| row.fitness).max()
    }

    /// Every island with at least one row, in order of first appearance.
    pub fn islands(&self) -> Vec<IslandId> {
        let mut islands: Vec<(usize, &IslandId)> = self
            .by_island
            .iter()
            .filter_map(|(island, positions)| Some((*positions.first()?, island)))
            .collect();
        islands.sort_unstable();
        islands.into_iter().map(|(_, island)| island.clone()).collect()
    }

    /// Sets every row's best-so-far to the running maximum fitness up to and
    /// including that row.
    pub fn refresh_best_so_far(&mut self) {
        let mut best: Option<i64> = None;
        for row in &mut self.rows {
            let current = best.map_or(row.fitness, |best| best.max(row.fitness));
            row.best_fitness_so_far = current;
            best = Some(current);
        }
    }

    fn island_positions(&self, island: &IslandId) -> &[usize] {
        self.by_island
            .get(island)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

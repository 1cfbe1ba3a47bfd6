use itertools::Itertools;

use crate::ast::{mark_parents_dirty, CachePolicy, CachedEvaluator, ExpressionCache, Round, TermRef};
use crate::config::Config;
use crate::env::Environment;
use crate::parse::Parser;
use crate::traits::walker;
use crate::types::TypeInfo;
use crate::value::Value;

/// One row of the watch list. Text that didn't compile is kept as typed, with
/// no term behind it, until the user fixes it.
#[derive(Debug, Default)]
pub struct WatchExpression {
    term: Option<TermRef>,
    wip_text: String,
    evaluator: Option<CachedEvaluator>,
    recent: Option<Value>,

    dirty: bool,
    needs_update: bool,
}

impl WatchExpression {
    fn compiled(term: TermRef) -> WatchExpression {
        WatchExpression {
            evaluator: Some(term.evaluator()),
            term: Some(term),
            ..Default::default()
        }
    }

    fn work_in_progress(text: &str) -> WatchExpression {
        WatchExpression {
            wip_text: text.to_owned(),
            ..Default::default()
        }
    }

    pub fn term(&self) -> Option<&TermRef> {
        self.term.as_ref()
    }

    pub fn is_wip(&self) -> bool {
        self.term.is_none()
    }

    pub fn expression_text(&self) -> String {
        match &self.term {
            Some(t) => t.to_string(),
            None => self.wip_text.clone(),
        }
    }

    pub fn value(&self) -> Option<Value> {
        self.recent
    }

    pub fn value_text(&self) -> String {
        match (&self.term, self.recent) {
            (None, _) => "<invalid>".to_owned(),
            (Some(_), Some(v)) => v.to_string(),
            (Some(_), None) => Value::Never.to_string(),
        }
    }

    pub fn type_text(&self, info: &TypeInfo) -> String {
        match self.recent {
            Some(v) if !self.is_wip() => v.type_name(info),
            _ => String::new(),
        }
    }

    pub fn dirty(&self) -> bool {
        self.dirty
    }

    /// Whether the row changed in the last refresh and should be redrawn.
    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    fn make_dirty(&mut self) {
        self.dirty = true;
        self.needs_update = true;
    }

    fn make_clean(&mut self, force: bool) {
        self.needs_update = self.dirty || force;
        self.dirty = false;
    }

    fn evaluate(&mut self, round: Round, policy: CachePolicy, env: &dyn Environment) {
        let evaluator = match self.evaluator.as_mut() {
            Some(e) => e,
            None => {
                self.recent = None;
                return;
            }
        };

        self.recent = match evaluator.evaluate_in(round, policy, env) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("could not evaluate '{}': {e}", evaluator.term());
                None
            }
        };
    }
}

/// The set of root expressions a debugger front end is watching, plus the
/// bookkeeping that keeps their values current as the simulation steps.
pub struct WatchList {
    cache: ExpressionCache,
    items: Vec<WatchExpression>,
    volatiles: Vec<CachedEvaluator>,
    refresh_policy: CachePolicy,
}

impl Default for WatchList {
    fn default() -> Self {
        Self::with_config(&Config::default())
    }
}

impl WatchList {
    pub fn new() -> WatchList {
        Self::default()
    }

    pub fn with_config(config: &Config) -> WatchList {
        WatchList {
            cache: ExpressionCache::new(),
            items: Vec::new(),
            volatiles: Vec::new(),
            refresh_policy: config.refresh_policy,
        }
    }

    pub fn cache(&self) -> &ExpressionCache {
        &self.cache
    }

    pub fn items(&self) -> &[WatchExpression] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The live leaves the watch list keeps an eye on between refreshes.
    pub fn volatiles(&self) -> impl Iterator<Item = &TermRef> {
        self.volatiles.iter().map(|e| e.term())
    }

    /// Indices of the rows that changed in the last refresh.
    pub fn dirty_roots(&self) -> Vec<usize> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.needs_update())
            .map(|(i, _)| i)
            .collect()
    }

    /// Append a row for `text` and evaluate it. Returns the new row's index.
    pub fn add_item(&mut self, text: &str, env: &dyn Environment) -> usize {
        let mut item = match Parser::new(&self.cache).compile(text) {
            Some(term) => WatchExpression::compiled(term),
            None => WatchExpression::work_in_progress(text),
        };

        item.make_dirty();
        item.evaluate(Round::next(), CachePolicy::UseNonVolatiles, env);
        self.items.push(item);

        self.gather_volatiles(env);

        self.items.len() - 1
    }

    /// Replace the text of row `index`. Returns whether the new text compiled;
    /// if it didn't, the row keeps the text as a work in progress.
    pub fn edit_term(&mut self, index: usize, text: &str, env: &dyn Environment) -> bool {
        if index >= self.items.len() {
            tracing::warn!("no watch expression at index {index} to edit");
            return false;
        }

        let compiled = Parser::new(&self.cache).compile(text);
        let ok = compiled.is_some();

        let item = &mut self.items[index];
        *item = match compiled {
            Some(term) => WatchExpression::compiled(term),
            None => WatchExpression::work_in_progress(text),
        };
        item.make_dirty();
        item.evaluate(Round::next(), CachePolicy::UseNonVolatiles, env);

        self.gather_volatiles(env);

        ok
    }

    /// Per-step refresh. Every volatile is read again first and dirtiness is
    /// pushed up from each one that changed; only once all of that is done are
    /// the rows classified and re-evaluated. All of it is one round, so each
    /// volatile is read from the environment once.
    pub fn update_volatile_values(&mut self, env: &dyn Environment) {
        let round = Round::next();
        let mut changed = Vec::new();

        for evaluator in self.volatiles.iter_mut() {
            let before = evaluator.cache().value;
            match evaluator.evaluate_in(round, CachePolicy::UseNonVolatiles, env) {
                Ok(after) if Some(after) == before => {}
                Ok(_) => changed.push(evaluator.term().clone()),
                Err(e) => {
                    tracing::warn!("could not read '{}': {e}", evaluator.term());
                    changed.push(evaluator.term().clone());
                }
            }
        }

        for term in changed.iter() {
            mark_parents_dirty(term);
        }

        for item in self.items.iter_mut() {
            if item.term.as_ref().map_or(false, |t| t.dirty()) {
                item.make_dirty();
            } else {
                item.make_clean(false);
            }
        }

        for item in self.items.iter_mut() {
            item.evaluate(round, self.refresh_policy, env);
        }

        tracing::debug!(
            "refreshed {} watch expressions, {} volatiles changed: [{}]",
            self.items.len(),
            changed.len(),
            changed.iter().join(", ")
        );
    }

    /// The debuggee was (re)started: every row gets redrawn.
    pub fn on_simulation_start(&mut self, env: &dyn Environment) {
        let round = Round::next();
        for item in self.items.iter_mut() {
            item.make_clean(true);
            item.evaluate(round, CachePolicy::UseNonVolatiles, env);
        }
    }

    fn gather_volatiles(&mut self, env: &dyn Environment) {
        let found = walker::gather_volatiles(self.items.iter().filter_map(|i| i.term.as_ref()));

        let round = Round::next();
        self.volatiles = found.into_iter().map(CachedEvaluator::new).collect();
        for evaluator in self.volatiles.iter_mut() {
            if let Err(e) = evaluator.evaluate_in(round, CachePolicy::UseNonVolatiles, env) {
                tracing::warn!("could not read '{}': {e}", evaluator.term());
            }
        }

        tracing::debug!("watching {} volatile terms", self.volatiles.len());

        self.cache.collect_garbage();
    }
}

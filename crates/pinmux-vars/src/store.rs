//! Variable arena and synchronous change propagation.
//!
//! The store owns every [`Variable`] and [`Expression`]. A change to a
//! variable is pushed depth-first through the expressions that read it: each
//! reader is invalidated and, if anything depends on its result (a binding, a
//! watcher or a bus listener), re-evaluated on the spot. A reader whose result
//! did not change stops the chain. Readers nobody observes stay invalidated
//! until the next read.
//!
//! Bindings are checked for cycles when they are registered, so propagation
//! always terminates.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use pinmux_core::{Bus, Properties, Status, StatusKind, StructuralError};
use serde::{Deserialize, Serialize};

use crate::error::{EvalError, VarError};
use crate::expr::{self, Modifier, Target, ValueSource};
use crate::expression::{same_outcome, Binding, ExprId, Expression, Outcome, Role};
use crate::settings::Settings;
use crate::value::Value;
use crate::variable::Variable;

/// Handle to a variable owned by a [`VariableStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarId(pub(crate) u32);

impl VarId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "var#{}", self.0)
    }
}

/// Source of a notification on the store's bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineNode {
    Variable(VarId),
    Expression(ExprId),
}

/// A change to a watched node, queued for the owner of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Variable(VarId),
    Expression(ExprId),
}

#[derive(Debug, Default)]
pub struct VariableStore {
    vars: Vec<Variable>,
    index: BTreeMap<String, VarId>,
    /// Per variable: expressions reading it.
    readers: Vec<Vec<ExprId>>,
    /// Per variable: expressions bound to it.
    controls: Vec<Vec<(ExprId, Role)>>,
    exprs: Vec<Expression>,
    bus: Bus<EngineNode>,
    watched_vars: HashSet<VarId>,
    effects: Vec<Effect>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a variable. Keys must be unique.
    pub fn add(&mut self, mut variable: Variable) -> Result<VarId, StructuralError> {
        if self.index.contains_key(variable.key()) {
            return Err(StructuralError::DuplicateVariable(variable.key().to_string()));
        }
        let id = VarId(self.vars.len() as u32);
        let status = variable.validation_status();
        variable.replace_status(status);
        tracing::trace!(key = variable.key(), kind = variable.kind().name(), "variable added");
        self.index.insert(variable.key().to_string(), id);
        self.vars.push(variable);
        self.readers.push(Vec::new());
        self.controls.push(Vec::new());
        Ok(id)
    }

    /// Resolve a key, accepting the legacy `$signal$` and `$$` prefixes.
    pub fn find(&self, key: &str) -> Option<VarId> {
        if let Some(id) = self.index.get(key) {
            return Some(*id);
        }
        let bare = key.strip_prefix("$signal$").or_else(|| key.strip_prefix("$$"))?;
        self.index.get(bare).copied()
    }

    pub fn lookup(&self, key: &str) -> Result<VarId, VarError> {
        self.find(key).ok_or_else(|| VarError::NotFound(key.to_string()))
    }

    pub fn get(&self, id: VarId) -> &Variable {
        &self.vars[id.index()]
    }

    pub fn variable(&self, key: &str) -> Option<&Variable> {
        self.find(key).map(|id| self.get(id))
    }

    /// Variables in key order.
    pub fn iter(&self) -> impl Iterator<Item = (VarId, &Variable)> {
        self.index.values().map(|id| (*id, &self.vars[id.index()]))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn bus(&self) -> &Bus<EngineNode> {
        &self.bus
    }

    pub fn expression(&self, id: ExprId) -> &Expression {
        &self.exprs[id.index()]
    }

    pub fn expressions(&self) -> impl Iterator<Item = (ExprId, &Expression)> {
        self.exprs.iter().enumerate().map(|(i, e)| (ExprId(i as u32), e))
    }

    // ---------------------------------------------------------------
    // Variable mutation
    // ---------------------------------------------------------------

    /// Set a variable's value. Returns false, without notifying, if the
    /// converted value equals the current one.
    pub fn set_value(&mut self, id: VarId, value: impl Into<Value>) -> Result<bool, VarError> {
        let value = self.vars[id.index()].translate(value.into())?;
        Ok(self.store_value(id, value))
    }

    pub fn set_value_by_key(&mut self, key: &str, value: impl Into<Value>) -> Result<bool, VarError> {
        let id = self.lookup(key)?;
        self.set_value(id, value)
    }

    /// Enable or disable a variable. Returns false if nothing changed.
    pub fn enable(&mut self, id: VarId, enabled: bool) -> bool {
        let var = &mut self.vars[id.index()];
        if var.is_enabled() == enabled {
            return false;
        }
        let before = var.effective_value().clone();
        var.set_enabled_raw(enabled);
        let mut properties = Properties::STATUS;
        if !var.effective_value().same_as(&before) {
            properties |= Properties::VALUE;
        }
        tracing::debug!(key = var.key(), enabled, "variable enable changed");
        self.refresh_status(id);
        self.variable_changed(id, properties);
        true
    }

    /// Show or hide a variable. Returns false if nothing changed.
    pub fn set_hidden(&mut self, id: VarId, hidden: bool) -> bool {
        let var = &mut self.vars[id.index()];
        if var.is_hidden() == hidden {
            return false;
        }
        var.set_hidden_raw(hidden);
        self.variable_changed(id, Properties::HIDDEN);
        true
    }

    fn store_value(&mut self, id: VarId, value: Value) -> bool {
        let var = &mut self.vars[id.index()];
        if var.value().same_as(&value) {
            return false;
        }
        tracing::debug!(key = var.key(), value = %value, "variable changed");
        var.set_value_raw(value);
        let mut properties = Properties::VALUE;
        if self.refresh_status(id) {
            properties |= Properties::STATUS;
        }
        self.variable_changed(id, properties);
        true
    }

    fn variable_changed(&mut self, id: VarId, properties: Properties) {
        self.bus.notify(EngineNode::Variable(id), properties);
        if self.watched_vars.contains(&id) {
            self.effects.push(Effect::Variable(id));
        }
        let readers = self.readers[id.index()].clone();
        for reader in readers {
            self.input_changed(reader);
        }
    }

    // ---------------------------------------------------------------
    // Status
    // ---------------------------------------------------------------

    fn compute_status(&self, id: VarId) -> Option<Status> {
        let var = &self.vars[id.index()];
        let mut disabled_by = None;
        for &(eid, role) in &self.controls[id.index()] {
            let expr = &self.exprs[eid.index()];
            let Some(outcome) = expr.published.as_ref() else {
                continue;
            };
            match (role, outcome) {
                (_, Err(e)) => return Some(expr.error_status(e)),
                (Role::ErrorIf, o) if Expression::holds(o) => {
                    return Some(Status::error(
                        StatusKind::Forced,
                        format!("{}: {}", var.name(), expr.source()),
                    ))
                }
                (Role::Value, Ok(v)) => {
                    if let Err(e) = var.translate(v.clone()) {
                        return Some(Status::error(StatusKind::Expression, e.to_string()));
                    }
                }
                (Role::EnabledBy, o) if !Expression::holds(o) => disabled_by = Some(expr.source()),
                _ => {}
            }
        }
        if let Some(status) = var.validation_status() {
            return Some(status);
        }
        if var.is_enabled() {
            return None;
        }
        Some(Status::info(
            StatusKind::Disabled,
            match disabled_by {
                Some(source) => format!("{} disabled by {source}", var.name()),
                None => format!("{} is disabled", var.name()),
            },
        ))
    }

    /// Recompute a variable's status. Returns true if it changed.
    fn refresh_status(&mut self, id: VarId) -> bool {
        let status = self.compute_status(id);
        self.vars[id.index()].replace_status(status)
    }

    fn update_status(&mut self, id: VarId) {
        if self.refresh_status(id) {
            self.bus.notify(EngineNode::Variable(id), Properties::STATUS);
        }
    }

    // ---------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------

    /// Compile a formula, subscribe it to every variable it names and
    /// evaluate it once.
    ///
    /// A bare word that names no variable is a text constant; a `/` path that
    /// names no variable compiles but fails to evaluate.
    pub fn compile(&mut self, formula: &str) -> Result<ExprId, StructuralError> {
        let mut root = expr::parse_formula(formula).map_err(|reason| StructuralError::ExpressionSyntax {
            expression: formula.to_string(),
            reason,
        })?;
        let mut inputs = Vec::new();
        root.visit_references_mut(&mut |r| {
            r.target = match self.find(&r.name) {
                Some(id) => {
                    if !inputs.contains(&id) {
                        inputs.push(id);
                    }
                    Target::Variable(id)
                }
                None if r.name.starts_with('/') => Target::Missing,
                None => Target::Symbol,
            };
        });

        let eid = ExprId(self.exprs.len() as u32);
        for input in &inputs {
            self.readers[input.index()].push(eid);
        }
        self.exprs.push(Expression::new(formula, root, inputs));
        let outcome = self.evaluate(eid);
        self.exprs[eid.index()].published = Some(outcome);
        tracing::trace!(%eid, formula, "expression compiled");
        Ok(eid)
    }

    /// Bind an expression to a variable.
    ///
    /// Fails with [`StructuralError::CircularDependency`] if the variable
    /// already feeds the expression, directly or through other bindings; the
    /// graph is left unchanged.
    pub fn bind(&mut self, expr: ExprId, target: VarId, role: Role) -> Result<(), StructuralError> {
        if role != Role::ErrorIf && self.reaches(target, expr) {
            let key = self.vars[target.index()].key().to_string();
            tracing::warn!(key = %key, formula = self.exprs[expr.index()].source(), "rejected circular binding");
            return Err(StructuralError::CircularDependency(format!(
                "{} -> {key}",
                self.exprs[expr.index()].source()
            )));
        }
        let binding = Binding { target, role };
        self.exprs[expr.index()].bindings.push(binding);
        self.controls[target.index()].push((expr, role));
        if role == Role::Value {
            self.vars[target.index()].set_derived(true);
        }
        let outcome = self.current(expr);
        self.exprs[expr.index()].published = Some(outcome.clone());
        self.apply_binding(binding, &outcome);
        Ok(())
    }

    /// Compile `formula` and bind it to the variable named `key`.
    pub fn compile_and_bind(&mut self, formula: &str, key: &str, role: Role) -> Result<ExprId, StructuralError> {
        let target = self
            .find(key)
            .ok_or_else(|| StructuralError::VariableNotFound(key.to_string()))?;
        let eid = self.compile(formula)?;
        self.bind(eid, target, role)?;
        Ok(eid)
    }

    /// True if a change to `from` can reach `expr`.
    fn reaches(&self, from: VarId, expr: ExprId) -> bool {
        fn dfs(store: &VariableStore, node: EngineNode, goal: ExprId, visited: &mut HashSet<EngineNode>) -> bool {
            if node == EngineNode::Expression(goal) {
                return true;
            }
            if !visited.insert(node) {
                return false;
            }
            match node {
                EngineNode::Variable(v) => store.readers[v.index()]
                    .iter()
                    .any(|e| dfs(store, EngineNode::Expression(*e), goal, visited)),
                EngineNode::Expression(e) => store.exprs[e.index()]
                    .bindings
                    .iter()
                    .filter(|b| b.role != Role::ErrorIf)
                    .any(|b| dfs(store, EngineNode::Variable(b.target), goal, visited)),
            }
        }
        dfs(self, EngineNode::Variable(from), expr, &mut HashSet::new())
    }

    fn evaluate(&mut self, eid: ExprId) -> Outcome {
        let outcome = expr::evaluate(&self.exprs[eid.index()].root, &*self);
        let expr = &mut self.exprs[eid.index()];
        expr.evaluations += 1;
        if let Err(e) = &outcome {
            tracing::debug!(formula = expr.source(), error = %e, "expression evaluation failed");
        }
        expr.cache = Some(outcome.clone());
        outcome
    }

    /// Cached outcome, re-evaluating if an input changed.
    fn current(&mut self, eid: ExprId) -> Outcome {
        match &self.exprs[eid.index()].cache {
            Some(outcome) => outcome.clone(),
            None => self.evaluate(eid),
        }
    }

    fn input_changed(&mut self, eid: ExprId) {
        let expr = &mut self.exprs[eid.index()];
        expr.cache = None;
        let observed =
            !expr.bindings.is_empty() || expr.watched || self.bus.has_listeners_for(EngineNode::Expression(eid));
        if !observed {
            return;
        }
        let outcome = self.evaluate(eid);
        let expr = &mut self.exprs[eid.index()];
        let mut properties = Properties::VALUE;
        match &expr.published {
            Some(previous) if same_outcome(previous, &outcome) => return,
            Some(previous) if previous.is_err() != outcome.is_err() => properties |= Properties::STATUS,
            _ => {}
        }
        expr.published = Some(outcome.clone());
        let watched = expr.watched;
        let bindings = expr.bindings.clone();

        self.bus.notify(EngineNode::Expression(eid), properties);
        if watched {
            self.effects.push(Effect::Expression(eid));
        }
        for binding in bindings {
            self.apply_binding(binding, &outcome);
        }
    }

    fn apply_binding(&mut self, binding: Binding, outcome: &Outcome) {
        let target = binding.target;
        match binding.role {
            Role::Value => {
                if let Ok(value) = outcome {
                    match self.vars[target.index()].translate(value.clone()) {
                        Ok(value) => {
                            self.store_value(target, value);
                        }
                        Err(e) => tracing::warn!(error = %e, "derived value rejected"),
                    }
                }
            }
            Role::EnabledBy => {
                self.enable(target, Expression::holds(outcome));
            }
            Role::HiddenBy => {
                self.set_hidden(target, Expression::holds(outcome));
            }
            Role::ErrorIf => {}
        }
        self.update_status(target);
    }

    /// Evaluate (if stale) and return the expression's result.
    pub fn evaluate_expression(&mut self, eid: ExprId) -> Result<Value, EvalError> {
        self.current(eid)
    }

    /// Expression value, or `None` if evaluation failed (see
    /// [`VariableStore::expression_status`]).
    pub fn expression_value(&mut self, eid: ExprId) -> Option<Value> {
        self.current(eid).ok()
    }

    pub fn expression_as_bool(&mut self, eid: ExprId) -> Option<bool> {
        self.expression_value(eid)?.as_bool()
    }

    pub fn expression_as_long(&mut self, eid: ExprId) -> Option<i64> {
        self.expression_value(eid)?.as_long()
    }

    pub fn expression_as_double(&mut self, eid: ExprId) -> Option<f64> {
        self.expression_value(eid)?.as_double()
    }

    pub fn expression_status(&mut self, eid: ExprId) -> Option<Status> {
        self.current(eid);
        self.exprs[eid.index()].status()
    }

    /// Queue an [`Effect`] whenever the expression's result changes. Watched
    /// expressions are evaluated eagerly.
    pub fn watch_expression(&mut self, eid: ExprId) {
        self.exprs[eid.index()].watched = true;
    }

    /// Queue an [`Effect`] whenever the variable changes.
    pub fn watch_variable(&mut self, id: VarId) {
        self.watched_vars.insert(id);
    }

    /// Drain queued effects, oldest first.
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    // ---------------------------------------------------------------
    // Persistence and substitution
    // ---------------------------------------------------------------

    pub fn persistent_value(&self, key: &str) -> Result<String, VarError> {
        Ok(self.get(self.lookup(key)?).persistent_value())
    }

    pub fn set_persistent_value(&mut self, key: &str, text: &str) -> Result<bool, VarError> {
        let id = self.lookup(key)?;
        let value = self.vars[id.index()].parse_persistent(text)?;
        Ok(self.store_value(id, value))
    }

    /// Write every non-derived variable into `settings`.
    pub fn save_to(&self, settings: &mut Settings) {
        for (_, var) in self.iter().filter(|(_, v)| !v.is_derived()) {
            settings.put(var.key(), var.persistent_value());
        }
    }

    /// Restore non-derived variables present in `settings`. Entries that fail
    /// to parse are skipped and returned.
    pub fn load_from(&mut self, settings: &Settings) -> Vec<VarError> {
        let keys: Vec<(VarId, String)> = self
            .iter()
            .filter(|(_, v)| !v.is_derived())
            .map(|(id, v)| (id, v.key().to_string()))
            .collect();
        let mut failures = Vec::new();
        for (id, key) in keys {
            let Some(text) = settings.get(&key) else {
                continue;
            };
            let parsed = self.vars[id.index()].parse_persistent(text);
            match parsed {
                Ok(value) => {
                    self.store_value(id, value);
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "ignoring unreadable setting");
                    failures.push(e);
                }
            }
        }
        failures
    }

    /// Code-generation text for `key`, `key.field` or `key[index].field`.
    ///
    /// An unknown variable is an error; field problems yield a diagnostic
    /// string instead.
    pub fn substitution_value(&self, key: &str) -> Result<String, VarError> {
        if let Some(id) = self.find(key) {
            return Ok(self.get(id).substitution_value());
        }
        let not_found = || VarError::NotFound(key.to_string());
        let (base, field) = key.rsplit_once('.').ok_or_else(not_found)?;
        if let Some(id) = self.find(base) {
            return Ok(self.get(id).field(field, None));
        }
        let (name, index) = split_index(base).ok_or_else(not_found)?;
        let var = self.get(self.find(name).ok_or_else(not_found)?);
        let index = index.or_else(|| var.selected_choice().map(|(i, _)| i));
        Ok(var.field(field, index))
    }
}

/// Split `name[3]` into `("name", Some(3))`; `name[]` (the current
/// selection) gives `None`.
fn split_index(base: &str) -> Option<(&str, Option<usize>)> {
    let open = base.rfind('[')?;
    let inner = base[open + 1..].strip_suffix(']')?;
    if inner.is_empty() {
        return Some((&base[..open], None));
    }
    inner.parse().ok().map(|i| (&base[..open], Some(i)))
}

impl ValueSource for VariableStore {
    fn reference_value(&self, id: VarId, modifier: Modifier) -> Value {
        let var = &self.vars[id.index()];
        match modifier {
            Modifier::Value => var.effective_value().clone(),
            Modifier::Enabled => Value::Bool(var.is_enabled()),
            Modifier::Hidden => Value::Bool(var.is_hidden()),
        }
    }
}

//! Structural Patch Algebra
//!
//! A [`Patch`] has the same shape as the state it targets, but every node
//! describes a mutation instead of a value. Patches are built by the rules
//! engine, applied by the driver, stored in the history log, and rebuilt
//! from two snapshots with [`diff`].
//!
//! ## Wire format
//!
//! ```text
//! {"$replace": v}          literal replace (bare non-object JSON also works)
//! {"$del": true}           remove the key from the parent map
//! {"$num": [{"add": -5}]}  numeric modifier stack
//! {"$list": [{"ins": [..]}, {"set": [i, v]}, {"upd": [i, patch]},
//!            {"deletes": [i, ..]}, {"del_values": [..]}, {"rep": [..]}]}
//! {"field": patch, ..}     nested sub-patch merged into the existing map
//! ```
//!
//! State field names must not start with `$`.
//!
//! ## Determinism
//!
//! `serde_json` is built without `preserve_order`, so every object is a
//! sorted map and both [`apply`] and serialization are byte-stable.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::numeric::{NumericModifier, NumericOp};

// =============================================================================
// ERRORS
// =============================================================================

/// A patch could not be built or applied.
///
/// Every variant carries the `/`-separated path of the offending node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    /// Target field has the wrong shape for the operation.
    #[error("type mismatch at {path}: expected {expected}")]
    TypeMismatch {
        /// Offending path.
        path: String,
        /// Shape the operation needed.
        expected: &'static str,
    },

    /// List operation addressed a missing index.
    #[error("index {index} out of range at {path} (len {len})")]
    IndexOutOfRange {
        /// Offending path.
        path: String,
        /// Requested index.
        index: usize,
        /// Length of the list.
        len: usize,
    },

    /// A numeric modifier and a non-numeric write met on one field.
    #[error("type conflict at {path}: numeric modifier mixed with a non-numeric write")]
    TypeConflict {
        /// Offending path.
        path: String,
    },

    /// Serialized patch could not be decoded.
    #[error("invalid patch encoding at {path}: {reason}")]
    InvalidEncoding {
        /// Offending path.
        path: String,
        /// What was wrong.
        reason: String,
    },
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

fn child_path(path: &str, key: impl fmt::Display) -> String {
    format!("{path}/{key}")
}

fn mismatch(path: &str, expected: &'static str) -> PatchError {
    PatchError::TypeMismatch { path: display_path(path), expected }
}

fn conflict(path: &str) -> PatchError {
    PatchError::TypeConflict { path: display_path(path) }
}

fn invalid(path: &str, reason: impl Into<String>) -> PatchError {
    PatchError::InvalidEncoding { path: display_path(path), reason: reason.into() }
}

fn out_of_range(path: &str, index: usize, len: usize) -> PatchError {
    PatchError::IndexOutOfRange { path: display_path(path), index, len }
}

// =============================================================================
// PATCH NODES
// =============================================================================

/// A single list operation. Operations in one list node run in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ListOp {
    /// Append values to the end.
    Insert(Vec<Value>),
    /// Overwrite the element at an index.
    Set(usize, Value),
    /// Apply a sub-patch to the element at an index.
    Update(usize, Patch),
    /// Remove the elements at these indices.
    Deletes(Vec<usize>),
    /// Remove the first occurrence of each value; absent values are skipped.
    DelValues(Vec<Value>),
    /// Replace the whole list.
    Replace(Vec<Value>),
}

/// Recursive structural delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum Patch {
    /// Literal full replace.
    Value(Value),
    /// Remove the field from its parent map.
    Delete,
    /// Add the folded modifier total to an integer field.
    Numeric(NumericModifier),
    /// Ordered list operations.
    List(Vec<ListOp>),
    /// Per-key sub-patches merged into an existing map.
    Map(BTreeMap<String, Patch>),
}

impl Default for Patch {
    fn default() -> Self {
        Patch::empty()
    }
}

impl Patch {
    /// The no-op patch.
    pub fn empty() -> Self {
        Patch::Map(BTreeMap::new())
    }

    /// True for the no-op patch.
    pub fn is_empty(&self) -> bool {
        matches!(self, Patch::Map(fields) if fields.is_empty())
    }

    /// Wrap `leaf` in nested map nodes so it targets `path`.
    pub fn at(path: &[&str], leaf: Patch) -> Patch {
        path.iter().rev().fold(leaf, |inner, key| {
            let mut fields = BTreeMap::new();
            fields.insert((*key).to_string(), inner);
            Patch::Map(fields)
        })
    }

    /// Merge a later patch into this one.
    ///
    /// - maps merge key by key
    /// - numeric stacks combine additively
    /// - list operations concatenate
    /// - literals and deletes win over whatever came before
    /// - a sub-patch after a literal is folded into the literal
    ///
    /// Mixing a numeric stack with any non-numeric write is a
    /// [`PatchError::TypeConflict`].
    pub fn merge(&mut self, other: Patch) -> Result<(), PatchError> {
        self.merge_node(other, "")
    }

    fn merge_node(&mut self, other: Patch, path: &str) -> Result<(), PatchError> {
        if other.is_empty() {
            return Ok(());
        }
        if self.is_empty() {
            *self = other;
            return Ok(());
        }

        match other {
            Patch::Numeric(theirs) => match self {
                Patch::Numeric(ours) => {
                    ours.combine(&theirs);
                    Ok(())
                }
                _ => Err(conflict(path)),
            },
            _ if matches!(self, Patch::Numeric(_)) => Err(conflict(path)),
            Patch::Value(_) | Patch::Delete => {
                *self = other;
                Ok(())
            }
            Patch::Map(theirs) => {
                if let Patch::Map(ours) = self {
                    for (key, sub) in theirs {
                        let child = child_path(path, &key);
                        match ours.get_mut(&key) {
                            Some(existing) => existing.merge_node(sub, &child)?,
                            None => {
                                ours.insert(key, sub);
                            }
                        }
                    }
                    return Ok(());
                }
                self.fold_into_literal(Patch::Map(theirs), path)
            }
            Patch::List(theirs) => {
                if let Patch::List(ours) = self {
                    ours.extend(theirs);
                    return Ok(());
                }
                self.fold_into_literal(Patch::List(theirs), path)
            }
        }
    }

    fn fold_into_literal(&mut self, other: Patch, path: &str) -> Result<(), PatchError> {
        let mut base = match self {
            Patch::Value(v) => v.clone(),
            Patch::Delete => Value::Null,
            _ => return Err(conflict(path)),
        };
        apply_node(&mut base, &other, path)?;
        *self = Patch::Value(base);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Builders
    // -------------------------------------------------------------------------

    /// Merge `leaf` at `path`.
    pub fn merge_at(&mut self, path: &[&str], leaf: Patch) -> Result<(), PatchError> {
        self.merge(Patch::at(path, leaf))
    }

    /// Literal write.
    pub fn set(&mut self, path: &[&str], value: impl Into<Value>) -> Result<(), PatchError> {
        self.merge_at(path, Patch::Value(value.into()))
    }

    /// Literal write of any serializable value.
    pub fn set_serialized<T: Serialize>(&mut self, path: &[&str], value: &T) -> Result<(), PatchError> {
        let value = serde_json::to_value(value)
            .map_err(|e| invalid(&path.join("/"), e.to_string()))?;
        self.set(path, value)
    }

    /// Remove the field at `path`.
    pub fn delete(&mut self, path: &[&str]) -> Result<(), PatchError> {
        self.merge_at(path, Patch::Delete)
    }

    /// Append `op` to the numeric stack at `path`, creating it if needed.
    ///
    /// Unlike [`Patch::merge`], this extends the existing fold, so a pushed
    /// `mul` scales every operation already on the stack.
    pub fn push_numeric(&mut self, path: &[&str], op: NumericOp) -> Result<(), PatchError> {
        let (last, parents) = match path.split_last() {
            Some(split) => split,
            None => return Err(conflict("")),
        };

        let mut node = self;
        let mut walked = String::new();
        for key in parents {
            walked = child_path(&walked, key);
            node = match node {
                Patch::Map(fields) => fields.entry((*key).to_string()).or_insert_with(Patch::empty),
                _ => return Err(conflict(&walked)),
            };
        }

        let leaf_path = child_path(&walked, last);
        let fields = match node {
            Patch::Map(fields) => fields,
            _ => return Err(conflict(&leaf_path)),
        };
        let leaf = fields.entry((*last).to_string()).or_insert_with(Patch::empty);
        match leaf {
            Patch::Numeric(stack) => stack.push(op),
            other if other.is_empty() => *other = Patch::Numeric(NumericModifier::from_op(op)),
            _ => return Err(conflict(&leaf_path)),
        }
        Ok(())
    }

    /// Append values to the list at `path`.
    pub fn list_insert(&mut self, path: &[&str], values: Vec<Value>) -> Result<(), PatchError> {
        self.merge_at(path, Patch::List(vec![ListOp::Insert(values)]))
    }

    /// Overwrite one element of the list at `path`.
    pub fn list_set(&mut self, path: &[&str], index: usize, value: impl Into<Value>) -> Result<(), PatchError> {
        self.merge_at(path, Patch::List(vec![ListOp::Set(index, value.into())]))
    }

    /// Patch one element of the list at `path`.
    pub fn list_update(&mut self, path: &[&str], index: usize, patch: Patch) -> Result<(), PatchError> {
        self.merge_at(path, Patch::List(vec![ListOp::Update(index, patch)]))
    }

    /// Remove elements by index from the list at `path`.
    pub fn list_delete(&mut self, path: &[&str], indices: Vec<usize>) -> Result<(), PatchError> {
        self.merge_at(path, Patch::List(vec![ListOp::Deletes(indices)]))
    }

    /// Remove elements by value from the list at `path`.
    pub fn list_delete_values(&mut self, path: &[&str], values: Vec<Value>) -> Result<(), PatchError> {
        self.merge_at(path, Patch::List(vec![ListOp::DelValues(values)]))
    }

    /// Replace the whole list at `path`.
    pub fn list_replace(&mut self, path: &[&str], values: Vec<Value>) -> Result<(), PatchError> {
        self.merge_at(path, Patch::List(vec![ListOp::Replace(values)]))
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    /// Node at `path`, if the patch touches it through map nodes.
    pub fn get(&self, path: &[&str]) -> Option<&Patch> {
        let mut node = self;
        for key in path {
            node = match node {
                Patch::Map(fields) => fields.get(*key)?,
                _ => return None,
            };
        }
        Some(node)
    }

    /// Folded total of the numeric stack at `path`.
    pub fn numeric_total(&self, path: &[&str]) -> Option<i64> {
        match self.get(path)? {
            Patch::Numeric(stack) => Some(stack.total()),
            _ => None,
        }
    }
}

// =============================================================================
// APPLY
// =============================================================================

/// Apply `patch` to `state`, returning the new state.
///
/// Works on a copy: on error the caller's state is untouched and the error
/// names the first offending path.
pub fn apply(state: &Value, patch: &Patch) -> Result<Value, PatchError> {
    let mut working = state.clone();
    apply_node(&mut working, patch, "")?;
    Ok(working)
}

fn apply_node(target: &mut Value, patch: &Patch, path: &str) -> Result<(), PatchError> {
    match patch {
        Patch::Value(v) => *target = v.clone(),
        // Only a map field can be deleted.
        Patch::Delete => return Err(mismatch(path, "map field")),
        Patch::Numeric(stack) => {
            let base = match target {
                Value::Null => 0,
                Value::Number(n) => n.as_i64().ok_or_else(|| mismatch(path, "integer"))?,
                _ => return Err(mismatch(path, "integer")),
            };
            *target = Value::from(stack.apply_to(base));
        }
        Patch::List(ops) => {
            if target.is_null() {
                *target = Value::Array(Vec::new());
            }
            let items = target.as_array_mut().ok_or_else(|| mismatch(path, "list"))?;
            for op in ops {
                apply_list_op(items, op, path)?;
            }
        }
        Patch::Map(fields) => {
            if fields.is_empty() {
                return Ok(());
            }
            if target.is_null() {
                *target = Value::Object(Map::new());
            }
            let object = target.as_object_mut().ok_or_else(|| mismatch(path, "map"))?;
            for (key, sub) in fields {
                match sub {
                    Patch::Delete => {
                        object.remove(key);
                    }
                    sub if sub.is_empty() => {}
                    sub => {
                        let slot = object.entry(key.clone()).or_insert(Value::Null);
                        apply_node(slot, sub, &child_path(path, key))?;
                    }
                }
            }
        }
    }
    Ok(())
}

fn apply_list_op(items: &mut Vec<Value>, op: &ListOp, path: &str) -> Result<(), PatchError> {
    match op {
        ListOp::Insert(values) => items.extend(values.iter().cloned()),
        ListOp::Set(index, value) => {
            let len = items.len();
            let slot = items.get_mut(*index).ok_or_else(|| out_of_range(path, *index, len))?;
            *slot = value.clone();
        }
        ListOp::Update(index, sub) => {
            let len = items.len();
            let slot = items.get_mut(*index).ok_or_else(|| out_of_range(path, *index, len))?;
            apply_node(slot, sub, &child_path(path, index))?;
        }
        ListOp::Deletes(indices) => {
            let len = items.len();
            if let Some(bad) = indices.iter().find(|i| **i >= len) {
                return Err(out_of_range(path, *bad, len));
            }
            let mut position = 0;
            items.retain(|_| {
                let keep = !indices.contains(&position);
                position += 1;
                keep
            });
        }
        ListOp::DelValues(values) => {
            for value in values {
                if let Some(found) = items.iter().position(|item| item == value) {
                    items.remove(found);
                }
            }
        }
        ListOp::Replace(values) => *items = values.clone(),
    }
    Ok(())
}

// =============================================================================
// DIFF
// =============================================================================

/// Structural difference such that `apply(a, &diff(a, b)) == b`.
///
/// Lists that `b` only extends at the tail produce an `ins` of the new
/// elements; any other list change is a literal replace.
pub fn diff(a: &Value, b: &Value) -> Patch {
    match (a, b) {
        (Value::Object(old), Value::Object(new)) => {
            let mut fields = BTreeMap::new();
            for (key, old_value) in old {
                match new.get(key) {
                    None => {
                        fields.insert(key.clone(), Patch::Delete);
                    }
                    Some(new_value) => {
                        let sub = diff(old_value, new_value);
                        if !sub.is_empty() {
                            fields.insert(key.clone(), sub);
                        }
                    }
                }
            }
            for (key, new_value) in new {
                if !old.contains_key(key) {
                    fields.insert(key.clone(), Patch::Value(new_value.clone()));
                }
            }
            Patch::Map(fields)
        }
        _ if a == b => Patch::empty(),
        (Value::Array(old), Value::Array(new))
            if new.len() > old.len() && new[..old.len()] == old[..] =>
        {
            Patch::List(vec![ListOp::Insert(new[old.len()..].to_vec())])
        }
        _ => Patch::Value(b.clone()),
    }
}

// =============================================================================
// WIRE CODEC
// =============================================================================

fn encode_list_op(op: ListOp) -> Value {
    let mut object = Map::new();
    match op {
        ListOp::Insert(values) => {
            object.insert("ins".into(), Value::Array(values));
        }
        ListOp::Set(index, value) => {
            object.insert("set".into(), Value::Array(vec![Value::from(index), value]));
        }
        ListOp::Update(index, patch) => {
            object.insert("upd".into(), Value::Array(vec![Value::from(index), Value::from(patch)]));
        }
        ListOp::Deletes(indices) => {
            object.insert("deletes".into(), Value::Array(indices.into_iter().map(Value::from).collect()));
        }
        ListOp::DelValues(values) => {
            object.insert("del_values".into(), Value::Array(values));
        }
        ListOp::Replace(values) => {
            object.insert("rep".into(), Value::Array(values));
        }
    }
    Value::Object(object)
}

impl From<Patch> for Value {
    fn from(patch: Patch) -> Value {
        let mut object = Map::new();
        match patch {
            Patch::Value(v @ Value::Object(_)) => {
                object.insert("$replace".into(), v);
            }
            Patch::Value(v) => return v,
            Patch::Delete => {
                object.insert("$del".into(), Value::Bool(true));
            }
            Patch::Numeric(stack) => {
                let ops = stack
                    .ops()
                    .iter()
                    .map(|op| {
                        let (name, operand) = match op {
                            NumericOp::Add(n) => ("add", *n),
                            NumericOp::Mul(n) => ("mul", *n),
                        };
                        let mut step = Map::new();
                        step.insert(name.into(), Value::from(operand));
                        Value::Object(step)
                    })
                    .collect();
                object.insert("$num".into(), Value::Array(ops));
            }
            Patch::List(ops) => {
                object.insert("$list".into(), Value::Array(ops.into_iter().map(encode_list_op).collect()));
            }
            Patch::Map(fields) => {
                for (key, sub) in fields {
                    object.insert(key, Value::from(sub));
                }
            }
        }
        Value::Object(object)
    }
}

impl TryFrom<Value> for Patch {
    type Error = PatchError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        decode(value, "")
    }
}

fn decode(value: Value, path: &str) -> Result<Patch, PatchError> {
    let mut object = match value {
        Value::Object(object) => object,
        literal => return Ok(Patch::Value(literal)),
    };

    if object.len() == 1 {
        if let Some(v) = object.remove("$replace") {
            return Ok(Patch::Value(v));
        }
        if let Some(v) = object.remove("$del") {
            return match v {
                Value::Bool(true) => Ok(Patch::Delete),
                _ => Err(invalid(path, "$del must be true")),
            };
        }
        if let Some(v) = object.remove("$num") {
            let stack: NumericModifier = serde_json::from_value(v)
                .map_err(|e| invalid(path, e.to_string()))?;
            return Ok(Patch::Numeric(stack));
        }
        if let Some(v) = object.remove("$list") {
            let ops = match v {
                Value::Array(ops) => ops,
                _ => return Err(invalid(path, "$list must be an array")),
            };
            return ops
                .into_iter()
                .map(|op| decode_list_op(op, path))
                .collect::<Result<Vec<_>, _>>()
                .map(Patch::List);
        }
    }

    let mut fields = BTreeMap::new();
    for (key, sub) in object {
        if key.starts_with('$') {
            return Err(invalid(path, format!("unknown directive {key}")));
        }
        let child = child_path(path, &key);
        let sub = decode(sub, &child)?;
        fields.insert(key, sub);
    }
    Ok(Patch::Map(fields))
}

fn decode_index(value: &Value, path: &str) -> Result<usize, PatchError> {
    value
        .as_u64()
        .map(|i| i as usize)
        .ok_or_else(|| invalid(path, "list index must be a non-negative integer"))
}

fn decode_values(value: Value, path: &str) -> Result<Vec<Value>, PatchError> {
    match value {
        Value::Array(values) => Ok(values),
        _ => Err(invalid(path, "expected an array")),
    }
}

fn decode_pair(value: Value, path: &str) -> Result<(usize, Value), PatchError> {
    let mut pair = decode_values(value, path)?;
    if pair.len() != 2 {
        return Err(invalid(path, "expected [index, value]"));
    }
    let second = pair.pop().unwrap_or(Value::Null);
    let index = decode_index(&pair[0], path)?;
    Ok((index, second))
}

fn decode_list_op(op: Value, path: &str) -> Result<ListOp, PatchError> {
    let object = match op {
        Value::Object(object) if object.len() == 1 => object,
        _ => return Err(invalid(path, "list op must be a single-key object")),
    };
    let (name, arg) = match object.into_iter().next() {
        Some(entry) => entry,
        None => return Err(invalid(path, "empty list op")),
    };
    match name.as_str() {
        "ins" => Ok(ListOp::Insert(decode_values(arg, path)?)),
        "set" => {
            let (index, value) = decode_pair(arg, path)?;
            Ok(ListOp::Set(index, value))
        }
        "upd" => {
            let (index, sub) = decode_pair(arg, path)?;
            Ok(ListOp::Update(index, decode(sub, &child_path(path, index))?))
        }
        "deletes" => decode_values(arg, path)?
            .iter()
            .map(|i| decode_index(i, path))
            .collect::<Result<Vec<_>, _>>()
            .map(ListOp::Deletes),
        "del_values" => Ok(ListOp::DelValues(decode_values(arg, path)?)),
        "rep" | "replace" => Ok(ListOp::Replace(decode_values(arg, path)?)),
        other => Err(invalid(path, format!("unknown list op {other}"))),
    }
}

// =============================================================================
// TESTS
// =============================================================================

//! This module contains the definition of the [`ModificationSet`], the
//! postcondition of a recorded invocation of a routine.

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
};

use itertools::Itertools;

use crate::{
    error::host,
    host::{write_field, Host},
    value::{ClassId, FieldOwner, FieldType, ObjectId, Value},
};

/// A single recorded write to a field.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldWrite {
    /// The declared type of the field.
    pub tp: FieldType,

    /// The value that the field held when the recording finished.
    pub value: Value,
}

/// The captured postcondition of a recorded routine invocation: the final value
/// of every field written during the invocation, and its return value.
///
/// Writes are keyed by owner and field name, and the _last_ write to a field
/// wins as it is the value the field holds once the routine returns.
///
/// A modification set only ever describes writes to objects that existed
/// before the invocation began, as the recorder refuses to summarize routines
/// that allocate.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ModificationSet {
    /// The arguments of the recorded invocation.
    args: Vec<Value>,

    /// Writes to instance fields.
    fields: BTreeMap<(ObjectId, String), FieldWrite>,

    /// Writes to static fields.
    static_fields: BTreeMap<(ClassId, String), FieldWrite>,

    /// The value returned by the invocation, if it returned one.
    return_value: Option<Value>,
}

impl ModificationSet {
    /// Creates a new, empty, modification set for an invocation with `args`.
    #[must_use]
    pub fn new(args: Vec<Value>) -> Self {
        let fields = BTreeMap::new();
        let static_fields = BTreeMap::new();
        let return_value = None;
        Self {
            args,
            fields,
            static_fields,
            return_value,
        }
    }

    /// Records that the field `name` of type `tp` on `target` was set to
    /// `value`, replacing any earlier write to the same field.
    ///
    /// # Panics
    ///
    /// Panics if `tp` is an array type or if `value` cannot be stored in a
    /// field of type `tp`. Both are programmer bugs.
    pub fn record_field_write(
        &mut self,
        name: impl Into<String>,
        tp: FieldType,
        target: ObjectId,
        value: Value,
    ) {
        Self::check_write(tp, &value);
        self.fields
            .insert((target, name.into()), FieldWrite { tp, value });
    }

    /// Records that the static field `name` of type `tp` on `class` was set to
    /// `value`, replacing any earlier write to the same field.
    ///
    /// # Panics
    ///
    /// Panics if `tp` is an array type or if `value` cannot be stored in a
    /// field of type `tp`. Both are programmer bugs.
    pub fn record_static_field_write(
        &mut self,
        name: impl Into<String>,
        tp: FieldType,
        class: ClassId,
        value: Value,
    ) {
        Self::check_write(tp, &value);
        self.static_fields
            .insert((class, name.into()), FieldWrite { tp, value });
    }

    /// Records a write to a field of `owner`, dispatching to
    /// [`Self::record_field_write`] or [`Self::record_static_field_write`].
    ///
    /// # Panics
    ///
    /// As for the methods it dispatches to.
    pub fn record(&mut self, owner: FieldOwner, name: impl Into<String>, tp: FieldType, value: Value) {
        match owner {
            FieldOwner::Object(object) => self.record_field_write(name, tp, object, value),
            FieldOwner::Class(class) => self.record_static_field_write(name, tp, class, value),
        }
    }

    fn check_write(tp: FieldType, value: &Value) {
        assert!(
            tp.is_snapshottable(),
            "Array typed fields cannot be part of a modification set"
        );
        assert!(
            value.conforms_to(tp),
            "Value {value} cannot be stored in a field of type {tp:?}"
        );
    }

    /// Sets the value returned by the recorded invocation.
    pub fn set_return_value(&mut self, value: Value) {
        self.return_value = Some(value);
    }

    /// Gets the value returned by the recorded invocation, if it returned one.
    #[must_use]
    pub fn return_value(&self) -> Option<&Value> {
        self.return_value.as_ref()
    }

    /// Gets the write recorded for the field `name` of `owner`, if any.
    #[must_use]
    pub fn recorded_write(&self, owner: FieldOwner, name: &str) -> Option<&FieldWrite> {
        match owner {
            FieldOwner::Object(object) => self.fields.get(&(object, name.to_string())),
            FieldOwner::Class(class) => self.static_fields.get(&(class, name.to_string())),
        }
    }

    /// Gets the number of distinct fields written.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.fields.len() + self.static_fields.len()
    }

    /// Iterates over the owners of every written field.
    fn targets(&self) -> impl Iterator<Item = FieldOwner> + '_ {
        let objects = self.fields.keys().map(|(object, _)| FieldOwner::Object(*object));
        let classes = self.static_fields.keys().map(|(class, _)| FieldOwner::Class(*class));
        objects.chain(classes)
    }

    /// Checks whether any of the written fields belongs to an owner that is
    /// currently frozen or shared.
    ///
    /// If this returns `true` the modification set must not be applied.
    #[must_use]
    pub fn any_target_frozen_or_shared(&self, host: &impl Host) -> bool {
        self.targets()
            .any(|owner| host.is_frozen(owner) || host.is_shared(owner))
    }

    /// Replays every recorded write into the `host` using its typed setters.
    ///
    /// The return value is not touched; pushing it is the responsibility of
    /// the caller. Callers must check [`Self::any_target_frozen_or_shared`]
    /// first.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the host rejects any of the writes. The host is then
    /// left partially updated, which only happens when a target has been
    /// destroyed since the summary was recorded.
    pub fn apply(&self, host: &mut impl Host) -> host::Result<()> {
        for ((object, name), write) in &self.fields {
            write_field(host, FieldOwner::Object(*object), name, write.tp, &write.value)?;
        }
        for ((class, name), write) in &self.static_fields {
            write_field(host, FieldOwner::Class(*class), name, write.tp, &write.value)?;
        }

        Ok(())
    }

    /// Adds every write made by `inner` to this set, replacing earlier writes
    /// to the same fields.
    pub fn merge_from(&mut self, inner: &ModificationSet) {
        for (key, write) in &inner.fields {
            self.fields.insert(key.clone(), write.clone());
        }
        for (key, write) in &inner.static_fields {
            self.static_fields.insert(key.clone(), write.clone());
        }
    }
}

/// Renders the modification set as a single line of JSON-like text for
/// diagnostics.
impl Display for ModificationSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let size = 1 + self.args.len() + self.write_count();
        let return_value = self
            .return_value
            .as_ref()
            .map_or_else(|| "void".to_string(), ToString::to_string);
        let args = self.args.iter().map(|a| format!("\"{a}\"")).join(",");
        let fields = self
            .fields
            .iter()
            .map(|((object, name), write)| {
                format!(
                    "{{\"fieldName\":\"{name}\", \"targetObject\":\"{object}\", \"value\":\"{}\"}}",
                    write.value
                )
            })
            .join(",");
        let static_fields = self
            .static_fields
            .iter()
            .map(|((class, name), write)| {
                format!(
                    "{{\"fieldName\":\"{name}\", \"classInfo\":\"{class}\", \"value\":\"{}\"}}",
                    write.value
                )
            })
            .join(",");

        write!(
            f,
            "{{\"modsSize\":{size}, \"returnValue\":\"{return_value}\", \"args\":[{args}], \
             \"fields\":[{fields}], \"staticFields\":[{static_fields}]}}"
        )
    }
}

#[cfg(test)]
mod test {
    use crate::{
        host::test_host::TestHost,
        summary::modifications::ModificationSet,
        value::{ClassId, FieldOwner, FieldType, ObjectId, Value},
    };

    const OBJ: FieldOwner = FieldOwner::Object(ObjectId(1));

    #[test]
    fn last_write_wins() {
        let mut mods = ModificationSet::new(vec![]);
        mods.record_field_write("x", FieldType::Int, ObjectId(1), Value::Int(2));
        mods.record_field_write("x", FieldType::Int, ObjectId(1), Value::Int(3));

        assert_eq!(mods.write_count(), 1);
        assert_eq!(mods.recorded_write(OBJ, "x").unwrap().value, Value::Int(3));
    }

    #[test]
    fn applies_every_write_through_typed_setters() -> anyhow::Result<()> {
        let mut host = TestHost::default();
        host.set(OBJ, "i", Value::Int(0));
        host.set(OBJ, "c", Value::Char(0));
        host.set(OBJ, "r", Value::Null);
        host.set(FieldOwner::Class(ClassId(2)), "d", Value::Double(0.0));

        let mut mods = ModificationSet::new(vec![]);
        mods.record_field_write("i", FieldType::Int, ObjectId(1), Value::Int(9));
        mods.record_field_write("c", FieldType::Char, ObjectId(1), Value::Char(66));
        mods.record_field_write("r", FieldType::Reference, ObjectId(1), Value::string("s"));
        mods.record_static_field_write("d", FieldType::Double, ClassId(2), Value::Double(2.5));
        mods.set_return_value(Value::Int(1));
        mods.apply(&mut host)?;

        assert_eq!(host.get(OBJ, "i"), Some(&Value::Int(9)));
        assert_eq!(host.get(OBJ, "c"), Some(&Value::Char(66)));
        assert_eq!(host.get(OBJ, "r"), Some(&Value::string("s")));
        assert_eq!(
            host.get(FieldOwner::Class(ClassId(2)), "d"),
            Some(&Value::Double(2.5))
        );

        // Applying never pushes the return value.
        assert!(host.pushed.is_empty());

        Ok(())
    }

    #[test]
    fn applying_twice_is_idempotent() -> anyhow::Result<()> {
        let mut host = TestHost::default();
        host.set(OBJ, "n", Value::Int(5));

        let mut mods = ModificationSet::new(vec![]);
        mods.record_field_write("n", FieldType::Int, ObjectId(1), Value::Int(6));

        mods.apply(&mut host)?;
        let after_first = host.fields.clone();
        host.set(OBJ, "n", Value::Int(5));
        mods.apply(&mut host)?;

        assert_eq!(host.fields, after_first);
        Ok(())
    }

    #[test]
    fn detects_frozen_and_shared_targets() {
        let mut host = TestHost::default();
        let mut mods = ModificationSet::new(vec![]);
        mods.record_static_field_write("s", FieldType::Bool, ClassId(0), Value::Bool(true));
        mods.record_field_write("n", FieldType::Int, ObjectId(1), Value::Int(6));

        assert!(!mods.any_target_frozen_or_shared(&host));

        host.frozen.insert(OBJ);
        assert!(mods.any_target_frozen_or_shared(&host));

        host.frozen.clear();
        host.shared.insert(FieldOwner::Class(ClassId(0)));
        assert!(mods.any_target_frozen_or_shared(&host));
    }

    #[test]
    fn merging_prefers_inner_writes() {
        let mut outer = ModificationSet::new(vec![]);
        outer.record_field_write("x", FieldType::Int, ObjectId(1), Value::Int(1));
        outer.record_field_write("y", FieldType::Int, ObjectId(1), Value::Int(1));

        let mut inner = ModificationSet::new(vec![]);
        inner.record_field_write("x", FieldType::Int, ObjectId(1), Value::Int(2));
        inner.set_return_value(Value::Int(100));

        outer.merge_from(&inner);

        assert_eq!(outer.recorded_write(OBJ, "x").unwrap().value, Value::Int(2));
        assert_eq!(outer.recorded_write(OBJ, "y").unwrap().value, Value::Int(1));
        assert_eq!(outer.return_value(), None);
    }

    #[test]
    #[should_panic(expected = "cannot be stored")]
    fn recording_a_mistyped_write_is_a_bug() {
        let mut mods = ModificationSet::new(vec![]);
        mods.record_field_write("x", FieldType::Long, ObjectId(1), Value::Int(1));
    }

    #[test]
    #[should_panic(expected = "Array typed fields")]
    fn recording_an_array_write_is_a_bug() {
        let mut mods = ModificationSet::new(vec![]);
        mods.record_field_write("xs", FieldType::Array, ObjectId(1), Value::Null);
    }
}

//! This module contains the definition of the [`Context`], the precondition
//! under which a recorded invocation of a routine took place.

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
};

use itertools::Itertools;

use crate::{
    host::Host,
    value::{ClassId, FieldOwner, ObjectId, Value},
};

/// The captured precondition of a recorded routine invocation.
///
/// A context consists of the arguments of the invocation, the callee object for
/// instance routines, whether the program was single threaded, and the value of
/// every field that was read while the invocation (or any invocation nested
/// inside it) executed.
///
/// # Field Tracking
///
/// Fields are keyed by their owner and name. The _first_ value observed for a
/// field is the one that is kept, as it is the value that the routine's
/// behaviour depended upon when the recording began.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Context {
    /// The arguments that the routine was invoked with.
    args: Vec<Value>,

    /// The object on which the routine was invoked, for instance routines.
    callee: Option<ObjectId>,

    /// Whether the program had a single runnable thread at invocation time.
    single_threaded: bool,

    /// The instance fields read during the invocation.
    fields: BTreeMap<(ObjectId, String), Value>,

    /// The static fields read during the invocation.
    static_fields: BTreeMap<(ClassId, String), Value>,
}

impl Context {
    /// Creates a new context for an invocation with the provided `args`, on the
    /// provided `callee` if the routine is an instance routine.
    #[must_use]
    pub fn new(args: Vec<Value>, callee: Option<ObjectId>, single_threaded: bool) -> Self {
        let fields = BTreeMap::new();
        let static_fields = BTreeMap::new();
        Self {
            args,
            callee,
            single_threaded,
            fields,
            static_fields,
        }
    }

    /// Checks whether an invocation on `callee` with `args` while
    /// `single_threaded` starts from a state that is observationally identical
    /// to the one captured by this context.
    ///
    /// Arguments are checked first, then the callee, then static fields and
    /// finally instance fields. The current value of each field is read through
    /// the `host`, and a field that the host cannot resolve never matches.
    ///
    /// # Panics
    ///
    /// Panics if exactly one of this context and the candidate has a callee, as
    /// the routine identity fixes whether a routine has a callee. This is a
    /// programmer bug.
    #[must_use]
    pub fn matches(
        &self,
        host: &impl Host,
        callee: Option<ObjectId>,
        args: &[Value],
        single_threaded: bool,
    ) -> bool {
        if self.single_threaded != single_threaded {
            return false;
        }

        if self.args.len() != args.len() || self.args.iter().zip(args).any(|(a, b)| a != b) {
            return false;
        }

        match (self.callee, callee) {
            (Some(expected), Some(actual)) if expected != actual => return false,
            (Some(_), Some(_)) | (None, None) => (),
            (expected, actual) => panic!(
                "Context callee {expected:?} cannot be matched against candidate callee \
                 {actual:?}"
            ),
        }

        let statics_match = self.static_fields.iter().all(|((class, name), value)| {
            host.field(FieldOwner::Class(*class), name).as_ref() == Some(value)
        });
        if !statics_match {
            return false;
        }

        self.fields.iter().all(|((object, name), value)| {
            host.field(FieldOwner::Object(*object), name).as_ref() == Some(value)
        })
    }

    /// Starts tracking the field `name` of `source` as having held `value`.
    ///
    /// Does nothing if the field is already tracked.
    pub fn add_field(&mut self, name: impl Into<String>, source: ObjectId, value: Value) {
        self.fields.entry((source, name.into())).or_insert(value);
    }

    /// Starts tracking the static field `name` of `class` as having held
    /// `value`.
    ///
    /// Does nothing if the field is already tracked.
    pub fn add_static_field(&mut self, name: impl Into<String>, class: ClassId, value: Value) {
        self.static_fields.entry((class, name.into())).or_insert(value);
    }

    /// Starts tracking a field of `owner`, dispatching to [`Self::add_field`]
    /// or [`Self::add_static_field`] as appropriate.
    pub fn add(&mut self, owner: FieldOwner, name: impl Into<String>, value: Value) {
        match owner {
            FieldOwner::Object(object) => self.add_field(name, object, value),
            FieldOwner::Class(class) => self.add_static_field(name, class, value),
        }
    }

    /// Adds every field tracked by `inner` that this context does not yet
    /// track.
    ///
    /// Entries already present in `self` are kept, as they were observed
    /// earlier than those in `inner`.
    pub fn merge_from(&mut self, inner: &Context) {
        for ((object, name), value) in &inner.fields {
            self.fields
                .entry((*object, name.clone()))
                .or_insert_with(|| value.clone());
        }
        for ((class, name), value) in &inner.static_fields {
            self.static_fields
                .entry((*class, name.clone()))
                .or_insert_with(|| value.clone());
        }
    }

    /// Checks whether the field `name` of `owner` is tracked.
    #[must_use]
    pub fn contains_field(&self, owner: FieldOwner, name: &str) -> bool {
        match owner {
            FieldOwner::Object(object) => self.fields.contains_key(&(object, name.to_string())),
            FieldOwner::Class(class) => {
                self.static_fields.contains_key(&(class, name.to_string()))
            }
        }
    }

    /// Gets the value tracked for the field `name` of `owner`, if any.
    #[must_use]
    pub fn tracked_value(&self, owner: FieldOwner, name: &str) -> Option<&Value> {
        match owner {
            FieldOwner::Object(object) => self.fields.get(&(object, name.to_string())),
            FieldOwner::Class(class) => self.static_fields.get(&(class, name.to_string())),
        }
    }

    /// Checks whether any static fields are tracked.
    #[must_use]
    pub fn has_static_fields(&self) -> bool {
        !self.static_fields.is_empty()
    }

    /// Iterates over every tracked field, instance fields first.
    pub fn tracked_fields(&self) -> impl Iterator<Item = (FieldOwner, &str, &Value)> + '_ {
        let fields = self
            .fields
            .iter()
            .map(|((object, name), value)| (FieldOwner::Object(*object), name.as_str(), value));
        let static_fields = self
            .static_fields
            .iter()
            .map(|((class, name), value)| (FieldOwner::Class(*class), name.as_str(), value));
        fields.chain(static_fields)
    }

    /// Gets the total number of tracked fields, static or otherwise.
    #[must_use]
    pub fn tracked_field_count(&self) -> usize {
        self.fields.len() + self.static_fields.len()
    }

    /// Gets the arguments captured by this context.
    #[must_use]
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Gets the callee captured by this context, if any.
    #[must_use]
    pub fn callee(&self) -> Option<ObjectId> {
        self.callee
    }

    /// Gets whether the context was captured while single threaded.
    #[must_use]
    pub fn single_threaded(&self) -> bool {
        self.single_threaded
    }
}

/// Renders the context as a single line of JSON-like text for diagnostics.
impl Display for Context {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let size = 1 + self.args.len() + self.tracked_field_count();
        let this = self.callee.map_or_else(|| "null".to_string(), |id| id.to_string());
        let args = self.args.iter().map(|a| format!("\"{a}\"")).join(",");
        let fields = self
            .fields
            .iter()
            .map(|((object, name), value)| {
                format!("{{\"fieldName\":\"{name}\", \"sourceObject\":\"{object}\", \"value\":\"{value}\"}}")
            })
            .join(",");
        let static_fields = self
            .static_fields
            .iter()
            .map(|((class, name), value)| format!("{{\"{name}\":\"{class}={value}\"}}"))
            .join(",");

        write!(
            f,
            "{{\"contextSize\":{size}, \"this\":\"{this}\", \"args\":[{args}], \"fields\":[{fields}], \
             \"staticFields\":[{static_fields}]}}"
        )
    }
}

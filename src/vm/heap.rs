//! This module contains the [`Heap`] of the reference interpreter, holding all
//! objects, arrays and static fields, and the [`FrameHost`] through which the
//! recorder sees the interpreter's state.

use std::collections::{HashMap, HashSet};

use crate::{
    error::host::{Error, Result},
    host::Host,
    value::{ClassId, FieldOwner, FieldType, ObjectId, Value},
    vm::program::ClassDef,
};

/// A typed storage location.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Slot {
    pub tp:    FieldType,
    pub value: Value,
}

impl Slot {
    /// Creates a slot of type `tp` holding its default value.
    #[must_use]
    pub fn new(tp: FieldType) -> Self {
        let value = tp.default_value();
        Self { tp, value }
    }
}

/// An object or array allocated on the heap.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HeapObject {
    /// The class of the object, or [`None`] for arrays.
    pub class: Option<ClassId>,

    pub fields: HashMap<String, Slot>,

    /// The elements of an array.
    pub elements: Vec<Value>,

    pub shared: bool,
    pub frozen: bool,
}

/// The per-class storage for static fields.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
struct ClassStatics {
    fields:      HashMap<String, Slot>,
    shared:      bool,
    frozen:      bool,
    initialized: bool,
}

/// The heap of the reference interpreter.
///
/// Objects are never collected, so an [`ObjectId`] stays valid for the lifetime
/// of the heap.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Heap {
    objects: Vec<HeapObject>,
    statics: HashMap<ClassId, ClassStatics>,

    /// The number of runnable threads in the interpreted program.
    threads: usize,
}

impl Heap {
    /// Creates a heap holding the default-initialized static fields of every
    /// class in `classes`, where each class's identity is its index.
    #[must_use]
    pub fn new(classes: &[ClassDef]) -> Self {
        let statics = (0u32..)
            .zip(classes)
            .map(|(id, class)| {
                let fields = class
                    .static_fields
                    .iter()
                    .map(|(name, tp)| (name.clone(), Slot::new(*tp)))
                    .collect();
                let statics = ClassStatics {
                    fields,
                    ..ClassStatics::default()
                };
                (ClassId(id), statics)
            })
            .collect();

        Self {
            objects: Vec::new(),
            statics,
            threads: 1,
        }
    }

    /// Allocates an instance of `class`, whose identity is `id`, with all of
    /// its fields holding their default values.
    pub fn allocate(&mut self, id: ClassId, class: &ClassDef) -> ObjectId {
        let fields = class
            .fields
            .iter()
            .map(|(name, tp)| (name.clone(), Slot::new(*tp)))
            .collect();
        self.push_object(HeapObject {
            class: Some(id),
            fields,
            ..HeapObject::default()
        })
    }

    /// Allocates an array of `length` zeroed `int`s.
    pub fn allocate_array(&mut self, length: usize) -> ObjectId {
        self.push_object(HeapObject {
            elements: vec![Value::Int(0); length],
            ..HeapObject::default()
        })
    }

    fn push_object(&mut self, object: HeapObject) -> ObjectId {
        let id = ObjectId(
            self.objects
                .len()
                .try_into()
                .unwrap_or_else(|_| panic!("Object count should not exceed {}", u32::MAX)),
        );
        self.objects.push(object);
        id
    }

    /// Gets the object with identity `id`.
    #[must_use]
    pub fn object(&self, id: ObjectId) -> Option<&HeapObject> {
        self.objects.get(id.0 as usize)
    }

    /// Gets the object with identity `id`.
    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut HeapObject> {
        self.objects.get_mut(id.0 as usize)
    }

    /// Gets the number of objects and arrays allocated so far.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Gets the slot of the field `name` on `owner`.
    #[must_use]
    pub fn slot(&self, owner: FieldOwner, name: &str) -> Option<&Slot> {
        match owner {
            FieldOwner::Object(id) => self.object(id)?.fields.get(name),
            FieldOwner::Class(class) => self.statics.get(&class)?.fields.get(name),
        }
    }

    /// Stores `value` into the field `name` on `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the field does not exist, or if `value` cannot be
    /// stored in a field of its type.
    pub fn store(&mut self, owner: FieldOwner, name: &str, value: Value) -> Result<()> {
        let fields = match owner {
            FieldOwner::Object(id) => self.objects.get_mut(id.0 as usize).map(|o| &mut o.fields),
            FieldOwner::Class(class) => self.statics.get_mut(&class).map(|s| &mut s.fields),
        }
        .ok_or(Error::NoSuchOwner(owner))?;
        let slot = fields.get_mut(name).ok_or_else(|| Error::NoSuchField {
            owner,
            field: name.to_string(),
        })?;

        if !value.conforms_to(slot.tp) {
            return Err(Error::TypeMismatch {
                expected: slot.tp,
                value:    value.to_string(),
            });
        }
        slot.value = value;

        Ok(())
    }

    /// Marks whether `owner` is reachable from more than one thread.
    pub fn set_shared(&mut self, owner: FieldOwner, shared: bool) {
        match owner {
            FieldOwner::Object(id) => {
                if let Some(object) = self.object_mut(id) {
                    object.shared = shared;
                }
            }
            FieldOwner::Class(class) => {
                if let Some(statics) = self.statics.get_mut(&class) {
                    statics.shared = shared;
                }
            }
        }
    }

    /// Marks whether the fields of `owner` may be mutated.
    pub fn set_frozen(&mut self, owner: FieldOwner, frozen: bool) {
        match owner {
            FieldOwner::Object(id) => {
                if let Some(object) = self.object_mut(id) {
                    object.frozen = frozen;
                }
            }
            FieldOwner::Class(class) => {
                if let Some(statics) = self.statics.get_mut(&class) {
                    statics.frozen = frozen;
                }
            }
        }
    }

    /// Checks whether `owner` is reachable from more than one thread.
    #[must_use]
    pub fn is_shared(&self, owner: FieldOwner) -> bool {
        match owner {
            FieldOwner::Object(id) => self.object(id).map_or(false, |o| o.shared),
            FieldOwner::Class(class) => self.statics.get(&class).map_or(false, |s| s.shared),
        }
    }

    /// Checks whether the fields of `owner` may not be mutated.
    #[must_use]
    pub fn is_frozen(&self, owner: FieldOwner) -> bool {
        match owner {
            FieldOwner::Object(id) => self.object(id).map_or(false, |o| o.frozen),
            FieldOwner::Class(class) => self.statics.get(&class).map_or(false, |s| s.frozen),
        }
    }

    /// Sets the number of runnable threads in the interpreted program.
    pub fn set_thread_count(&mut self, threads: usize) {
        self.threads = threads;
    }

    /// Checks whether the interpreted program has exactly one runnable thread.
    #[must_use]
    pub fn is_single_threaded(&self) -> bool {
        self.threads == 1
    }

    /// Marks `class` as initialized, returning whether it was not already.
    pub fn mark_initialized(&mut self, class: ClassId) -> bool {
        self.statics
            .get_mut(&class)
            .map_or(false, |s| !std::mem::replace(&mut s.initialized, true))
    }
}

/// The view of the interpreter's state that is handed to the recorder: the
/// heap, and the operand stack of the innermost frame.
#[derive(Debug)]
pub struct FrameHost<'a> {
    heap:  &'a mut Heap,
    stack: &'a mut Vec<Value>,
}

impl<'a> FrameHost<'a> {
    /// Creates a view over `heap` that pushes return values onto `stack`.
    pub fn new(heap: &'a mut Heap, stack: &'a mut Vec<Value>) -> Self {
        Self { heap, stack }
    }
}

impl Host for FrameHost<'_> {
    fn field(&self, owner: FieldOwner, field: &str) -> Option<Value> {
        self.heap.slot(owner, field).map(|slot| slot.value.clone())
    }

    fn is_shared(&self, owner: FieldOwner) -> bool {
        self.heap.is_shared(owner)
    }

    fn is_frozen(&self, owner: FieldOwner) -> bool {
        self.heap.is_frozen(owner)
    }

    fn is_single_threaded(&self) -> bool {
        self.heap.is_single_threaded()
    }

    fn set_int_field(&mut self, owner: FieldOwner, field: &str, value: i32) -> Result<()> {
        self.heap.store(owner, field, Value::Int(value))
    }

    fn set_long_field(&mut self, owner: FieldOwner, field: &str, value: i64) -> Result<()> {
        self.heap.store(owner, field, Value::Long(value))
    }

    fn set_float_field(&mut self, owner: FieldOwner, field: &str, value: f32) -> Result<()> {
        self.heap.store(owner, field, Value::Float(value))
    }

    fn set_double_field(&mut self, owner: FieldOwner, field: &str, value: f64) -> Result<()> {
        self.heap.store(owner, field, Value::Double(value))
    }

    fn set_short_field(&mut self, owner: FieldOwner, field: &str, value: i16) -> Result<()> {
        self.heap.store(owner, field, Value::Short(value))
    }

    fn set_byte_field(&mut self, owner: FieldOwner, field: &str, value: i8) -> Result<()> {
        self.heap.store(owner, field, Value::Byte(value))
    }

    fn set_char_field(&mut self, owner: FieldOwner, field: &str, value: u16) -> Result<()> {
        self.heap.store(owner, field, Value::Char(value))
    }

    fn set_bool_field(&mut self, owner: FieldOwner, field: &str, value: bool) -> Result<()> {
        self.heap.store(owner, field, Value::Bool(value))
    }

    fn set_reference_field(&mut self, owner: FieldOwner, field: &str, value: &Value) -> Result<()> {
        self.heap.store(owner, field, value.clone())
    }

    fn push_int(&mut self, value: i32) -> Result<()> {
        self.stack.push(Value::Int(value));
        Ok(())
    }

    fn push_long(&mut self, value: i64) -> Result<()> {
        self.stack.push(Value::Long(value));
        Ok(())
    }

    fn push_float(&mut self, value: f32) -> Result<()> {
        self.stack.push(Value::Float(value));
        Ok(())
    }

    fn push_double(&mut self, value: f64) -> Result<()> {
        self.stack.push(Value::Double(value));
        Ok(())
    }

    fn push_reference(&mut self, value: &Value) -> Result<()> {
        self.stack.push(value.clone());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::{
        error::host::Error,
        host::{write_field, Host},
        value::{ClassId, FieldOwner, FieldType, Value},
        vm::{
            heap::{FrameHost, Heap},
            program::ClassDef,
        },
    };

    fn classes() -> Vec<ClassDef> {
        vec![ClassDef::new("Point")
            .with_field("x", FieldType::Int)
            .with_field("flag", FieldType::Bool)
            .with_static_field("count", FieldType::Long)]
    }

    #[test]
    fn fields_start_at_their_defaults() {
        let classes = classes();
        let mut heap = Heap::new(&classes);
        let point = heap.allocate(ClassId(0), &classes[0]);

        let slot = heap.slot(FieldOwner::Object(point), "flag").map(|s| &s.value);
        assert_eq!(slot, Some(&Value::Bool(false)));
        let slot = heap.slot(FieldOwner::Class(ClassId(0)), "count").map(|s| &s.value);
        assert_eq!(slot, Some(&Value::Long(0)));
    }

    #[test]
    fn stores_are_type_checked() -> anyhow::Result<()> {
        let classes = classes();
        let mut heap = Heap::new(&classes);
        let point = FieldOwner::Object(heap.allocate(ClassId(0), &classes[0]));

        heap.store(point, "x", Value::Int(4))?;
        assert!(matches!(
            heap.store(point, "x", Value::Long(4)),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            heap.store(point, "y", Value::Int(4)),
            Err(Error::NoSuchField { .. })
        ));
        assert!(matches!(
            heap.store(FieldOwner::Class(ClassId(9)), "count", Value::Long(1)),
            Err(Error::NoSuchOwner(_))
        ));

        Ok(())
    }

    #[test]
    fn frame_host_writes_fields_and_pushes_onto_the_stack() -> anyhow::Result<()> {
        let classes = classes();
        let mut heap = Heap::new(&classes);
        let point = FieldOwner::Object(heap.allocate(ClassId(0), &classes[0]));
        let mut stack = Vec::new();

        let mut host = FrameHost::new(&mut heap, &mut stack);
        write_field(&mut host, point, "flag", FieldType::Bool, &Value::Bool(true))?;
        host.push_int(3)?;
        assert_eq!(host.field(point, "flag"), Some(Value::Bool(true)));
        assert!(host.is_single_threaded());

        assert_eq!(stack, vec![Value::Int(3)]);
        heap.set_thread_count(2);
        heap.set_shared(point, true);
        assert!(!FrameHost::new(&mut heap, &mut stack).is_single_threaded());
        assert!(heap.is_shared(point));

        Ok(())
    }

    #[test]
    fn classes_are_initialized_once() {
        let mut heap = Heap::new(&classes());
        assert!(heap.mark_initialized(ClassId(0)));
        assert!(!heap.mark_initialized(ClassId(0)));
    }
}

//! This module contains the definition of the programs that the reference
//! interpreter executes: classes with their fields, and routines with their
//! code.

use bimap::BiMap;

use crate::{
    recorder::event::RoutineKind,
    value::{ClassId, FieldType, RoutineId},
    vm::instruction::Instruction,
};

/// The definition of a class.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClassDef {
    /// The name of the class.
    pub name: String,

    /// The instance fields of the class, in declaration order.
    pub fields: Vec<(String, FieldType)>,

    /// The static fields of the class, in declaration order.
    pub static_fields: Vec<(String, FieldType)>,

    /// The class initializer, run the first time the class is used.
    pub initializer: Option<RoutineId>,
}

impl ClassDef {
    /// Creates a new class definition named `name` with no fields.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name:          name.into(),
            fields:        Vec::new(),
            static_fields: Vec::new(),
            initializer:   None,
        }
    }

    /// Adds an instance field named `name` of type `tp`.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, tp: FieldType) -> Self {
        self.fields.push((name.into(), tp));
        self
    }

    /// Adds a static field named `name` of type `tp`.
    #[must_use]
    pub fn with_static_field(mut self, name: impl Into<String>, tp: FieldType) -> Self {
        self.static_fields.push((name.into(), tp));
        self
    }
}

/// The definition of a routine.
#[derive(Clone, Debug, PartialEq)]
pub struct Routine {
    /// The fully-qualified name of the routine, assigned when it is added to a
    /// [`Program`].
    pub name: String,

    /// The class the routine belongs to.
    pub class: ClassId,

    pub kind: RoutineKind,

    /// The parameter types, excluding the receiver.
    pub params: Vec<FieldType>,

    /// The return type, or [`None`] if the routine returns nothing.
    pub returns: Option<FieldType>,

    /// The number of local variable slots, including those holding the
    /// receiver and the arguments.
    pub locals: u16,

    pub code: Vec<Instruction>,
}

impl Routine {
    /// Creates a new routine with the simple name `name` and no code.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: RoutineKind) -> Self {
        Self {
            name: name.into(),
            class: ClassId(0),
            kind,
            params: Vec::new(),
            returns: None,
            locals: 0,
            code: Vec::new(),
        }
    }

    /// Sets the parameter types of the routine.
    #[must_use]
    pub fn with_params(mut self, params: Vec<FieldType>) -> Self {
        self.params = params;
        self
    }

    /// Sets the return type of the routine.
    #[must_use]
    pub fn returning(mut self, tp: FieldType) -> Self {
        self.returns = Some(tp);
        self
    }

    /// Sets the number of local variable slots of the routine.
    #[must_use]
    pub fn with_locals(mut self, locals: u16) -> Self {
        self.locals = locals;
        self
    }

    /// Sets the code of the routine.
    #[must_use]
    pub fn with_code(mut self, code: Vec<Instruction>) -> Self {
        self.code = code;
        self
    }

    /// Checks whether the routine is invoked on a receiver object.
    #[must_use]
    pub fn has_receiver(&self) -> bool {
        matches!(self.kind, RoutineKind::Instance | RoutineKind::Constructor)
    }

    /// Gets the offset of the last return instruction in the routine's code.
    #[must_use]
    pub fn final_return(&self) -> Option<usize> {
        self.code.iter().rposition(Instruction::is_return)
    }
}

/// A complete program: the classes and routines it consists of.
///
/// Classes and routines are identified by their index in the program, and can
/// also be looked up by name.
#[derive(Clone, Debug, Default)]
pub struct Program {
    classes:       Vec<ClassDef>,
    routines:      Vec<Routine>,
    class_names:   BiMap<String, ClassId>,
    routine_names: BiMap<String, RoutineId>,
}

impl Program {
    /// Creates a new, empty, program.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `class` to the program, returning its identity.
    ///
    /// # Panics
    ///
    /// Panics if the program holds more than [`u32::MAX`] classes. This is a
    /// programmer bug.
    pub fn add_class(&mut self, class: ClassDef) -> ClassId {
        let id = ClassId(
            self.classes
                .len()
                .try_into()
                .unwrap_or_else(|_| panic!("Class count should not exceed {}", u32::MAX)),
        );
        self.class_names.insert(class.name.clone(), id);
        self.classes.push(class);
        id
    }

    /// Gets the identity that the next routine added will receive, allowing
    /// recursive routines to refer to themselves.
    ///
    /// # Panics
    ///
    /// Panics if the program holds more than [`u32::MAX`] routines. This is a
    /// programmer bug.
    #[must_use]
    pub fn next_routine_id(&self) -> RoutineId {
        RoutineId(
            self.routines
                .len()
                .try_into()
                .unwrap_or_else(|_| panic!("Routine count should not exceed {}", u32::MAX)),
        )
    }

    /// Adds `routine` to `class`, returning the routine's identity.
    ///
    /// The routine's name is qualified with the class name. A class initializer
    /// becomes the initializer of `class`.
    ///
    /// # Panics
    ///
    /// Panics if `class` is not part of this program. This is a programmer bug.
    pub fn add_routine(&mut self, class: ClassId, mut routine: Routine) -> RoutineId {
        let id = self.next_routine_id();
        let class_def = self
            .classes
            .get_mut(class.0 as usize)
            .unwrap_or_else(|| panic!("Routines can only be added to existing classes"));
        if routine.kind == RoutineKind::ClassInitializer {
            class_def.initializer = Some(id);
        }

        routine.name = format!("{}.{}", class_def.name, routine.name);
        routine.class = class;
        self.routine_names.insert(routine.name.clone(), id);
        self.routines.push(routine);
        id
    }

    /// Gets the definition of `class`.
    #[must_use]
    pub fn class(&self, class: ClassId) -> Option<&ClassDef> {
        self.classes.get(class.0 as usize)
    }

    /// Gets the definition of `routine`.
    #[must_use]
    pub fn routine(&self, routine: RoutineId) -> Option<&Routine> {
        self.routines.get(routine.0 as usize)
    }

    /// Looks up a class by name.
    #[must_use]
    pub fn class_id(&self, name: &str) -> Option<ClassId> {
        self.class_names.get_by_left(name).copied()
    }

    /// Looks up a routine by its fully-qualified name.
    #[must_use]
    pub fn routine_id(&self, name: &str) -> Option<RoutineId> {
        self.routine_names.get_by_left(name).copied()
    }

    /// Gets the fully-qualified name of `routine`.
    #[must_use]
    pub fn routine_name(&self, routine: RoutineId) -> Option<&str> {
        self.routine_names.get_by_right(&routine).map(String::as_str)
    }

    /// Gets all the classes in the program, in identity order.
    #[must_use]
    pub fn classes(&self) -> &[ClassDef] {
        &self.classes
    }
}

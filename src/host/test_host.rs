//! A map-backed [`Host`] double for unit tests.

use std::collections::{HashMap, HashSet};

use crate::{
    error::host::{Error, Result},
    host::Host,
    value::{FieldOwner, Value},
};

/// A host whose fields live in a flat map, with switchable shared and frozen
/// flags per owner.
#[derive(Clone, Debug)]
pub struct TestHost {
    pub fields:          HashMap<(FieldOwner, String), Value>,
    pub shared:          HashSet<FieldOwner>,
    pub frozen:          HashSet<FieldOwner>,
    pub single_threaded: bool,
    pub pushed:          Vec<Value>,
    pub writes:          usize,
}

impl TestHost {
    pub fn set(&mut self, owner: FieldOwner, field: &str, value: Value) {
        self.fields.insert((owner, field.to_string()), value);
    }

    pub fn get(&self, owner: FieldOwner, field: &str) -> Option<&Value> {
        self.fields.get(&(owner, field.to_string()))
    }

    fn store(&mut self, owner: FieldOwner, field: &str, value: Value) -> Result<()> {
        let slot = self
            .fields
            .get_mut(&(owner, field.to_string()))
            .ok_or_else(|| Error::NoSuchField {
                owner,
                field: field.to_string(),
            })?;
        *slot = value;
        self.writes += 1;
        Ok(())
    }
}

impl Default for TestHost {
    fn default() -> Self {
        Self {
            fields:          HashMap::new(),
            shared:          HashSet::new(),
            frozen:          HashSet::new(),
            single_threaded: true,
            pushed:          Vec::new(),
            writes:          0,
        }
    }
}

impl Host for TestHost {
    fn field(&self, owner: FieldOwner, field: &str) -> Option<Value> {
        self.get(owner, field).cloned()
    }

    fn is_shared(&self, owner: FieldOwner) -> bool {
        self.shared.contains(&owner)
    }

    fn is_frozen(&self, owner: FieldOwner) -> bool {
        self.frozen.contains(&owner)
    }

    fn is_single_threaded(&self) -> bool {
        self.single_threaded
    }

    fn set_int_field(&mut self, owner: FieldOwner, field: &str, value: i32) -> Result<()> {
        self.store(owner, field, Value::Int(value))
    }

    fn set_long_field(&mut self, owner: FieldOwner, field: &str, value: i64) -> Result<()> {
        self.store(owner, field, Value::Long(value))
    }

    fn set_float_field(&mut self, owner: FieldOwner, field: &str, value: f32) -> Result<()> {
        self.store(owner, field, Value::Float(value))
    }

    fn set_double_field(&mut self, owner: FieldOwner, field: &str, value: f64) -> Result<()> {
        self.store(owner, field, Value::Double(value))
    }

    fn set_short_field(&mut self, owner: FieldOwner, field: &str, value: i16) -> Result<()> {
        self.store(owner, field, Value::Short(value))
    }

    fn set_byte_field(&mut self, owner: FieldOwner, field: &str, value: i8) -> Result<()> {
        self.store(owner, field, Value::Byte(value))
    }

    fn set_char_field(&mut self, owner: FieldOwner, field: &str, value: u16) -> Result<()> {
        self.store(owner, field, Value::Char(value))
    }

    fn set_bool_field(&mut self, owner: FieldOwner, field: &str, value: bool) -> Result<()> {
        self.store(owner, field, Value::Bool(value))
    }

    fn set_reference_field(
        &mut self,
        owner: FieldOwner,
        field: &str,
        value: &Value,
    ) -> Result<()> {
        self.store(owner, field, value.clone())
    }

    fn push_int(&mut self, value: i32) -> Result<()> {
        self.pushed.push(Value::Int(value));
        Ok(())
    }

    fn push_long(&mut self, value: i64) -> Result<()> {
        self.pushed.push(Value::Long(value));
        Ok(())
    }

    fn push_float(&mut self, value: f32) -> Result<()> {
        self.pushed.push(Value::Float(value));
        Ok(())
    }

    fn push_double(&mut self, value: f64) -> Result<()> {
        self.pushed.push(Value::Double(value));
        Ok(())
    }

    fn push_reference(&mut self, value: &Value) -> Result<()> {
        self.pushed.push(value.clone());
        Ok(())
    }
}

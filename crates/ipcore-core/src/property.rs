//! Typed property/container model.
//!
//! A [`Property`] is a named, resizable array of one fixed element type
//! ([`Layout`]) and arity (`width`, e.g. 16 for a 4x4 matrix). Properties
//! live in named [`Component`]s, and components live in a
//! [`PropertyContainer`]. Full names are written `component.property`;
//! component names may themselves contain `:` (`lut:output.size`).

use crate::error::{IpError, Result};
use glam::Mat4;
use half::f16;
use serde::{Deserialize, Serialize};

/// Element type of a property. Fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Layout {
    Float,
    Int,
    Bool,
    Double,
    Half,
    Byte,
    Short,
    String,
    Compound,
}

impl Layout {
    pub fn name(self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Int => "int",
            Self::Bool => "bool",
            Self::Double => "double",
            Self::Half => "half",
            Self::Byte => "byte",
            Self::Short => "short",
            Self::String => "string",
            Self::Compound => "compound",
        }
    }
}

/// Flat storage for a property's elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyData {
    Float(Vec<f32>),
    Int(Vec<i32>),
    Bool(Vec<bool>),
    Double(Vec<f64>),
    Half(Vec<f16>),
    Byte(Vec<u8>),
    Short(Vec<u16>),
    String(Vec<String>),
    /// Each element is a record of named sub-properties.
    Compound(Vec<Vec<Property>>),
}

impl PropertyData {
    /// Empty storage for `layout`.
    pub fn empty(layout: Layout) -> Self {
        match layout {
            Layout::Float => Self::Float(Vec::new()),
            Layout::Int => Self::Int(Vec::new()),
            Layout::Bool => Self::Bool(Vec::new()),
            Layout::Double => Self::Double(Vec::new()),
            Layout::Half => Self::Half(Vec::new()),
            Layout::Byte => Self::Byte(Vec::new()),
            Layout::Short => Self::Short(Vec::new()),
            Layout::String => Self::String(Vec::new()),
            Layout::Compound => Self::Compound(Vec::new()),
        }
    }

    pub fn layout(&self) -> Layout {
        match self {
            Self::Float(_) => Layout::Float,
            Self::Int(_) => Layout::Int,
            Self::Bool(_) => Layout::Bool,
            Self::Double(_) => Layout::Double,
            Self::Half(_) => Layout::Half,
            Self::Byte(_) => Layout::Byte,
            Self::Short(_) => Layout::Short,
            Self::String(_) => Layout::String,
            Self::Compound(_) => Layout::Compound,
        }
    }

    /// Number of scalars stored.
    pub fn scalar_len(&self) -> usize {
        match self {
            Self::Float(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::Bool(v) => v.len(),
            Self::Double(v) => v.len(),
            Self::Half(v) => v.len(),
            Self::Byte(v) => v.len(),
            Self::Short(v) => v.len(),
            Self::String(v) => v.len(),
            Self::Compound(v) => v.len(),
        }
    }

    /// Resize to `n` scalars, filling with the layout's zero value.
    fn resize_scalars(&mut self, n: usize) {
        match self {
            Self::Float(v) => v.resize(n, 0.0),
            Self::Int(v) => v.resize(n, 0),
            Self::Bool(v) => v.resize(n, false),
            Self::Double(v) => v.resize(n, 0.0),
            Self::Half(v) => v.resize(n, f16::ZERO),
            Self::Byte(v) => v.resize(n, 0),
            Self::Short(v) => v.resize(n, 0),
            Self::String(v) => v.resize(n, String::new()),
            Self::Compound(v) => v.resize(n, Vec::new()),
        }
    }

    /// Append `other`. Returns false when the layouts differ.
    fn extend_from(&mut self, other: &PropertyData) -> bool {
        match (self, other) {
            (Self::Float(a), Self::Float(b)) => a.extend_from_slice(b),
            (Self::Int(a), Self::Int(b)) => a.extend_from_slice(b),
            (Self::Bool(a), Self::Bool(b)) => a.extend_from_slice(b),
            (Self::Double(a), Self::Double(b)) => a.extend_from_slice(b),
            (Self::Half(a), Self::Half(b)) => a.extend_from_slice(b),
            (Self::Byte(a), Self::Byte(b)) => a.extend_from_slice(b),
            (Self::Short(a), Self::Short(b)) => a.extend_from_slice(b),
            (Self::String(a), Self::String(b)) => a.extend_from_slice(b),
            (Self::Compound(a), Self::Compound(b)) => a.extend_from_slice(b),
            _ => return false,
        }
        true
    }
}

/// A Rust type that can be stored in a property.
pub trait PropertyValue: Sized + Clone {
    const LAYOUT: Layout;
    /// Scalars per element.
    const WIDTH: usize = 1;

    fn to_data(values: Vec<Self>) -> PropertyData;

    /// Read element `index`.
    fn read(data: &PropertyData, index: usize) -> Option<Self>;

    /// Overwrite element `index`. Returns false if out of bounds or mistyped.
    fn write(self, data: &mut PropertyData, index: usize) -> bool;
}

macro_rules! scalar_value {
    ($ty:ty, $variant:ident) => {
        impl PropertyValue for $ty {
            const LAYOUT: Layout = Layout::$variant;

            fn to_data(values: Vec<Self>) -> PropertyData {
                PropertyData::$variant(values)
            }

            fn read(data: &PropertyData, index: usize) -> Option<Self> {
                match data {
                    PropertyData::$variant(v) => v.get(index).cloned(),
                    _ => None,
                }
            }

            fn write(self, data: &mut PropertyData, index: usize) -> bool {
                match data {
                    PropertyData::$variant(v) => match v.get_mut(index) {
                        Some(slot) => {
                            *slot = self;
                            true
                        }
                        None => false,
                    },
                    _ => false,
                }
            }
        }
    };
}

scalar_value!(f32, Float);
scalar_value!(i32, Int);
scalar_value!(bool, Bool);
scalar_value!(f64, Double);
scalar_value!(f16, Half);
scalar_value!(u8, Byte);
scalar_value!(u16, Short);
scalar_value!(String, String);

macro_rules! array_value {
    ($ty:ty, $variant:ident, $n:expr) => {
        impl PropertyValue for [$ty; $n] {
            const LAYOUT: Layout = Layout::$variant;
            const WIDTH: usize = $n;

            fn to_data(values: Vec<Self>) -> PropertyData {
                PropertyData::$variant(values.into_iter().flatten().collect())
            }

            fn read(data: &PropertyData, index: usize) -> Option<Self> {
                match data {
                    PropertyData::$variant(v) => v
                        .get(index * $n..index * $n + $n)
                        .and_then(|s| <[$ty; $n]>::try_from(s).ok()),
                    _ => None,
                }
            }

            fn write(self, data: &mut PropertyData, index: usize) -> bool {
                match data {
                    PropertyData::$variant(v) => match v.get_mut(index * $n..index * $n + $n) {
                        Some(slot) => {
                            slot.copy_from_slice(&self);
                            true
                        }
                        None => false,
                    },
                    _ => false,
                }
            }
        }
    };
}

array_value!(f32, Float, 2);
array_value!(f32, Float, 3);
array_value!(f32, Float, 4);
array_value!(i32, Int, 2);
array_value!(i32, Int, 3);

/// `Mat44f` properties: sixteen floats, column-major.
impl PropertyValue for Mat4 {
    const LAYOUT: Layout = Layout::Float;
    const WIDTH: usize = 16;

    fn to_data(values: Vec<Self>) -> PropertyData {
        PropertyData::Float(values.iter().flat_map(|m| m.to_cols_array()).collect())
    }

    fn read(data: &PropertyData, index: usize) -> Option<Self> {
        match data {
            PropertyData::Float(v) => v.get(index * 16..index * 16 + 16).map(Mat4::from_cols_slice),
            _ => None,
        }
    }

    fn write(self, data: &mut PropertyData, index: usize) -> bool {
        match data {
            PropertyData::Float(v) => match v.get_mut(index * 16..index * 16 + 16) {
                Some(slot) => {
                    slot.copy_from_slice(&self.to_cols_array());
                    true
                }
                None => false,
            },
            _ => false,
        }
    }
}

/// A named, typed, resizable array value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    name: String,
    layout: Layout,
    width: usize,
    data: PropertyData,
}

impl Property {
    /// Create a property holding `values`.
    pub fn new<T: PropertyValue>(name: impl Into<String>, values: Vec<T>) -> Self {
        Self {
            name: name.into(),
            layout: T::LAYOUT,
            width: T::WIDTH,
            data: T::to_data(values),
        }
    }

    /// Create an empty property of the given layout and width.
    pub fn empty(name: impl Into<String>, layout: Layout, width: usize) -> Self {
        Self {
            name: name.into(),
            layout,
            width: width.max(1),
            data: PropertyData::empty(layout),
        }
    }

    /// Create a compound property from records of sub-properties.
    pub fn compound(name: impl Into<String>, records: Vec<Vec<Property>>) -> Self {
        Self {
            name: name.into(),
            layout: Layout::Compound,
            width: 1,
            data: PropertyData::Compound(records),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn data(&self) -> &PropertyData {
        &self.data
    }

    /// Number of elements (scalars divided by width).
    pub fn len(&self) -> usize {
        self.data.scalar_len() / self.width
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn type_label(layout: Layout, width: usize) -> String {
        if width == 1 {
            layout.name().to_string()
        } else {
            format!("{}[{}]", layout.name(), width)
        }
    }

    fn check<T: PropertyValue>(&self) -> Result<()> {
        if self.layout == T::LAYOUT && self.width == T::WIDTH {
            Ok(())
        } else {
            Err(IpError::BadPropertyTypeMatch {
                name: self.name.clone(),
                expected: Self::type_label(T::LAYOUT, T::WIDTH),
                found: Self::type_label(self.layout, self.width),
            })
        }
    }

    fn check_same(&self, other: &Property) -> Result<()> {
        if self.layout == other.layout && self.width == other.width {
            Ok(())
        } else {
            Err(IpError::BadPropertyTypeMatch {
                name: self.name.clone(),
                expected: Self::type_label(self.layout, self.width),
                found: Self::type_label(other.layout, other.width),
            })
        }
    }

    /// Element `index`.
    pub fn get<T: PropertyValue>(&self, index: usize) -> Result<T> {
        self.check::<T>()?;
        T::read(&self.data, index).ok_or_else(|| {
            IpError::NoSuchProperty(format!("{}[{}] (size {})", self.name, index, self.len()))
        })
    }

    /// All elements.
    pub fn values<T: PropertyValue>(&self) -> Result<Vec<T>> {
        self.check::<T>()?;
        Ok((0..self.len()).filter_map(|i| T::read(&self.data, i)).collect())
    }

    /// Overwrite element `index`, growing the property by one when
    /// `index == len()`.
    pub fn set<T: PropertyValue>(&mut self, index: usize, value: T) -> Result<()> {
        self.check::<T>()?;
        if index == self.len() {
            self.resize(index + 1);
        }
        if value.write(&mut self.data, index) {
            Ok(())
        } else {
            Err(IpError::NoSuchProperty(format!(
                "{}[{}] (size {})",
                self.name,
                index,
                self.len()
            )))
        }
    }

    /// Replace all elements.
    pub fn set_values<T: PropertyValue>(&mut self, values: Vec<T>) -> Result<()> {
        self.check::<T>()?;
        self.data = T::to_data(values);
        Ok(())
    }

    /// Resize to `n` elements. New elements take the layout's zero value.
    pub fn resize(&mut self, n: usize) {
        self.data.resize_scalars(n * self.width);
    }

    /// Replace this property's contents with `other`'s.
    pub fn copy(&mut self, other: &Property) -> Result<()> {
        self.check_same(other)?;
        self.data = other.data.clone();
        Ok(())
    }

    /// Append `other`'s elements.
    pub fn concatenate(&mut self, other: &Property) -> Result<()> {
        self.check_same(other)?;
        if self.data.extend_from(&other.data) {
            Ok(())
        } else {
            Err(IpError::Internal(format!(
                "property {} has inconsistent storage",
                self.name
            )))
        }
    }
}

/// A named group of properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Component {
    name: String,
    properties: Vec<Property>,
}

impl Component {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    fn property_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.properties.iter_mut().find(|p| p.name == name)
    }
}

/// Owner of a node's components and properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyContainer {
    components: Vec<Component>,
}

fn split_name(name: &str) -> Result<(&str, &str)> {
    name.rsplit_once('.')
        .filter(|(c, p)| !c.is_empty() && !p.is_empty())
        .ok_or_else(|| IpError::NoSuchProperty(format!("{} is not component.property", name)))
}

impl PropertyContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name == name)
    }

    fn component_entry(&mut self, name: &str) -> &mut Component {
        let index = match self.components.iter().position(|c| c.name == name) {
            Some(i) => i,
            None => {
                self.components.push(Component::new(name));
                self.components.len() - 1
            }
        };
        &mut self.components[index]
    }

    /// Full names of every property, in declaration order.
    pub fn names(&self) -> Vec<String> {
        self.components
            .iter()
            .flat_map(|c| c.properties.iter().map(move |p| format!("{}.{}", c.name, p.name)))
            .collect()
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        let (c, p) = split_name(name).ok()?;
        self.component(c)?.property(p)
    }

    pub fn property_mut(&mut self, name: &str) -> Option<&mut Property> {
        let (c, p) = split_name(name).ok()?;
        self.components
            .iter_mut()
            .find(|comp| comp.name == c)?
            .property_mut(p)
    }

    fn require(&self, name: &str) -> Result<&Property> {
        self.property(name)
            .ok_or_else(|| IpError::NoSuchProperty(name.to_string()))
    }

    fn require_mut(&mut self, name: &str) -> Result<&mut Property> {
        self.property_mut(name)
            .ok_or_else(|| IpError::NoSuchProperty(name.to_string()))
    }

    /// Insert or replace a whole property under `component`.
    pub fn insert(&mut self, component: &str, property: Property) {
        let comp = self.component_entry(component);
        match comp.property_mut(&property.name) {
            Some(existing) => *existing = property,
            None => comp.properties.push(property),
        }
    }

    /// Declare a single-element property with a default value.
    ///
    /// Declaring an existing property of the same type keeps its value.
    pub fn declare<T: PropertyValue>(&mut self, name: &str, default: T) -> Result<()> {
        self.declare_array(name, vec![default])
    }

    /// Declare a property with an initial array of values.
    pub fn declare_array<T: PropertyValue>(&mut self, name: &str, values: Vec<T>) -> Result<()> {
        let (c, p) = split_name(name)?;
        if let Some(existing) = self.property(name) {
            return existing.check::<T>();
        }
        self.insert(c, Property::new(p, values));
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Property> {
        let (c, p) = split_name(name).ok()?;
        let comp = self.components.iter_mut().find(|comp| comp.name == c)?;
        let index = comp.properties.iter().position(|prop| prop.name == p)?;
        Some(comp.properties.remove(index))
    }

    /// First element of a property.
    pub fn get<T: PropertyValue>(&self, name: &str) -> Result<T> {
        self.require(name)?.get(0)
    }

    /// First element of a property, or `default` when missing, empty or mistyped.
    pub fn get_or<T: PropertyValue>(&self, name: &str, default: T) -> T {
        self.get(name).unwrap_or(default)
    }

    pub fn values<T: PropertyValue>(&self, name: &str) -> Result<Vec<T>> {
        self.require(name)?.values()
    }

    /// Set the first element of a declared property.
    pub fn set<T: PropertyValue>(&mut self, name: &str, value: T) -> Result<()> {
        self.require_mut(name)?.set(0, value)
    }

    pub fn set_values<T: PropertyValue>(&mut self, name: &str, values: Vec<T>) -> Result<()> {
        self.require_mut(name)?.set_values(values)
    }

    pub fn resize(&mut self, name: &str, n: usize) -> Result<()> {
        self.require_mut(name)?.resize(n);
        Ok(())
    }

    /// Copy every property of `other` into this container. Existing
    /// properties must have a matching type.
    pub fn copy_from(&mut self, other: &PropertyContainer) -> Result<()> {
        for comp in &other.components {
            for prop in &comp.properties {
                match self.component_entry(&comp.name).property_mut(&prop.name) {
                    Some(existing) => existing.copy(prop)?,
                    None => self.insert(&comp.name, prop.clone()),
                }
            }
        }
        Ok(())
    }

    /// Append every property of `other` onto the matching property here.
    pub fn concatenate(&mut self, other: &PropertyContainer) -> Result<()> {
        for comp in &other.components {
            for prop in &comp.properties {
                match self.component_entry(&comp.name).property_mut(&prop.name) {
                    Some(existing) => existing.concatenate(prop)?,
                    None => self.insert(&comp.name, prop.clone()),
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declare_and_get() {
        let mut pc = PropertyContainer::new();
        pc.declare("timing.useCutInfo", 1i32).unwrap();
        pc.declare("output.fps", 0.0f32).unwrap();
        pc.declare("output.outOfRangePolicy", "hold".to_string())
            .unwrap();
        assert_eq!(pc.get::<i32>("timing.useCutInfo").unwrap(), 1);
        assert_eq!(pc.get::<String>("output.outOfRangePolicy").unwrap(), "hold");
        assert_eq!(pc.names().len(), 3);
    }

    #[test]
    fn test_redeclare_keeps_value() {
        let mut pc = PropertyContainer::new();
        pc.declare("node.active", 1i32).unwrap();
        pc.set("node.active", 0i32).unwrap();
        pc.declare("node.active", 1i32).unwrap();
        assert_eq!(pc.get::<i32>("node.active").unwrap(), 0);
    }

    #[test]
    fn test_redeclare_with_other_type_fails() {
        let mut pc = PropertyContainer::new();
        pc.declare("node.active", 1i32).unwrap();
        let err = pc.declare("node.active", 1.0f32).unwrap_err();
        assert!(matches!(err, IpError::BadPropertyTypeMatch { .. }));
    }

    #[test]
    fn test_get_wrong_type() {
        let mut pc = PropertyContainer::new();
        pc.declare("output.fps", 24.0f32).unwrap();
        assert!(pc.get::<i32>("output.fps").is_err());
        assert_eq!(pc.get_or("output.fps", 0i32), 0);
        assert!(matches!(
            pc.get::<f32>("output.missing"),
            Err(IpError::NoSuchProperty(_))
        ));
    }

    #[test]
    fn test_resize_fills_default() {
        let mut pc = PropertyContainer::new();
        pc.declare_array("output.size", vec![720i32, 480]).unwrap();
        pc.resize("output.size", 4).unwrap();
        assert_eq!(pc.values::<i32>("output.size").unwrap(), vec![720, 480, 0, 0]);
        pc.resize("output.size", 1).unwrap();
        assert_eq!(pc.values::<i32>("output.size").unwrap(), vec![720]);
    }

    #[test]
    fn test_copy_type_mismatch() {
        let mut a = Property::new("scale", vec![1.0f32]);
        let b = Property::new("scale", vec![1i32]);
        assert!(matches!(
            a.copy(&b),
            Err(IpError::BadPropertyTypeMatch { .. })
        ));
        let c = Property::new("scale", vec![2.0f32, 3.0]);
        a.copy(&c).unwrap();
        assert_eq!(a.values::<f32>().unwrap(), vec![2.0, 3.0]);
    }

    #[test]
    fn test_concatenate() {
        let mut a = Property::new("frames", vec![1i32, 2]);
        a.concatenate(&Property::new("frames", vec![3i32]))
            .unwrap();
        assert_eq!(a.values::<i32>().unwrap(), vec![1, 2, 3]);
        assert!(a.concatenate(&Property::new("frames", vec![1u8])).is_err());
    }

    #[test]
    fn test_matrix_property() {
        let mut pc = PropertyContainer::new();
        let m = Mat4::from_scale(glam::Vec3::new(2.0, 3.0, 4.0));
        pc.declare("lut.inMatrix", Mat4::IDENTITY).unwrap();
        pc.set("lut.inMatrix", m).unwrap();
        assert_eq!(pc.get::<Mat4>("lut.inMatrix").unwrap(), m);
        let prop = pc.property("lut.inMatrix").unwrap();
        assert_eq!(prop.width(), 16);
        assert_eq!(prop.len(), 1);
        assert!(pc.get::<f32>("lut.inMatrix").is_err());
    }

    #[test]
    fn test_vector_elements() {
        let mut p = Property::new("size", vec![[0i32, 0, 0]]);
        p.set(0, [16i32, 16, 16]).unwrap();
        p.set(1, [2i32, 2, 2]).unwrap();
        assert_eq!(p.len(), 2);
        assert_eq!(p.get::<[i32; 3]>(1).unwrap(), [2, 2, 2]);
    }

    #[test]
    fn test_half_and_compound_layouts() {
        let h = Property::new("gain", vec![f16::from_f32(0.5)]);
        assert_eq!(h.layout(), Layout::Half);
        assert_eq!(h.get::<f16>(0).unwrap().to_f32(), 0.5);

        let record = vec![Property::new("name", vec!["a".to_string()])];
        let c = Property::compound("entries", vec![record.clone(), record]);
        assert_eq!(c.layout(), Layout::Compound);
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn test_component_names_with_colon() {
        let mut pc = PropertyContainer::new();
        pc.declare("lut:output.size", 256i32).unwrap();
        assert!(pc.component("lut:output").is_some());
        assert_eq!(pc.get::<i32>("lut:output.size").unwrap(), 256);
    }

    #[test]
    fn test_container_copy_and_concatenate() {
        let mut a = PropertyContainer::new();
        a.declare("edl.frame", 1i32).unwrap();
        let mut b = PropertyContainer::new();
        b.declare_array("edl.frame", vec![10i32, 20]).unwrap();
        b.declare("edl.in", 5i32).unwrap();

        a.concatenate(&b).unwrap();
        assert_eq!(a.values::<i32>("edl.frame").unwrap(), vec![1, 10, 20]);
        assert_eq!(a.get::<i32>("edl.in").unwrap(), 5);

        a.copy_from(&b).unwrap();
        assert_eq!(a.values::<i32>("edl.frame").unwrap(), vec![10, 20]);

        let mut bad = PropertyContainer::new();
        bad.declare("edl.in", 5.0f32).unwrap();
        assert!(a.copy_from(&bad).is_err());
    }

    #[test]
    fn test_remove() {
        let mut pc = PropertyContainer::new();
        pc.declare("a.b", 1i32).unwrap();
        assert!(pc.remove("a.b").is_some());
        assert!(pc.property("a.b").is_none());
        assert!(pc.remove("a.b").is_none());
    }
}

//! The closed set of property value types.
//!
//! Every type that can be stored in a [`PropertyVariable`](super::PropertyVariable)
//! implements [`PropertyValue`], which fixes its runtime type tag and its
//! canonical string encoding. Using any other type is a compile error.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use glam::DVec3;

/// Runtime type tag of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PropertyType {
    /// A nested property group.
    Group,
    /// `i32` value.
    Int,
    /// `f64` value.
    Double,
    /// `bool` value.
    Bool,
    /// `String` value.
    String,
    /// Filesystem path.
    Path,
    /// Selection over an item list.
    Selection,
    /// 3-D position.
    Position,
    /// RGBA color.
    Color,
    /// Trigger (button-like) value.
    Trigger,
    /// Transfer function.
    TransferFunction,
    /// Object property with its own string conversion.
    Struct,
}

impl PropertyType {
    /// Whether this tag denotes a group.
    pub fn is_property_group(self) -> bool {
        matches!(self, Self::Group)
    }

    /// Upper-case name of the tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Group => "GROUP",
            Self::Int => "INT",
            Self::Double => "DOUBLE",
            Self::Bool => "BOOL",
            Self::String => "STRING",
            Self::Path => "PATH",
            Self::Selection => "SELECTION",
            Self::Position => "POSITION",
            Self::Color => "COLOR",
            Self::Trigger => "TRIGGER",
            Self::TransferFunction => "TRANSFER_FUNCTION",
            Self::Struct => "STRUCT",
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is supposed to modify a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PropertyPurpose {
    /// Output of the owner, not meant to be modified by others.
    Information,
    /// A parameter others may change to steer the owner.
    #[default]
    Parameter,
}

/// A value type that can live in a property.
pub trait PropertyValue: Clone + Send + Sync + fmt::Debug + 'static {
    /// The runtime tag of properties holding this type.
    const PROPERTY_TYPE: PropertyType;

    /// Canonical string encoding.
    fn to_property_string(&self) -> String;

    /// Parse the canonical encoding.
    ///
    /// `current` is the value being replaced. Types whose string form only
    /// carries part of the state (a selection only stores indices) take the
    /// rest from it.
    fn from_property_string(value: &str, current: &Self) -> Option<Self>;

    /// Wrap into the type-erased variant.
    fn into_variant(self) -> PropertyVariant;

    /// Unwrap from the type-erased variant, if the kind matches.
    fn from_variant(variant: PropertyVariant) -> Option<Self>;
}

/// A property value of any supported kind.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyVariant {
    Int(i32),
    Double(f64),
    Bool(bool),
    String(String),
    Path(PathBuf),
    Selection(Selection),
    Position(DVec3),
    Color(Color),
    Trigger(Trigger),
    TransferFunction(TransferFunction),
}

impl PropertyVariant {
    /// The tag of the wrapped kind.
    pub fn property_type(&self) -> PropertyType {
        match self {
            Self::Int(_) => PropertyType::Int,
            Self::Double(_) => PropertyType::Double,
            Self::Bool(_) => PropertyType::Bool,
            Self::String(_) => PropertyType::String,
            Self::Path(_) => PropertyType::Path,
            Self::Selection(_) => PropertyType::Selection,
            Self::Position(_) => PropertyType::Position,
            Self::Color(_) => PropertyType::Color,
            Self::Trigger(_) => PropertyType::Trigger,
            Self::TransferFunction(_) => PropertyType::TransferFunction,
        }
    }
}

macro_rules! impl_variant {
    ($variant:ident) => {
        fn into_variant(self) -> PropertyVariant {
            PropertyVariant::$variant(self)
        }

        fn from_variant(variant: PropertyVariant) -> Option<Self> {
            match variant {
                PropertyVariant::$variant(value) => Some(value),
                _ => None,
            }
        }
    };
}

impl PropertyValue for i32 {
    const PROPERTY_TYPE: PropertyType = PropertyType::Int;

    fn to_property_string(&self) -> String {
        self.to_string()
    }

    fn from_property_string(value: &str, _current: &Self) -> Option<Self> {
        value.trim().parse().ok()
    }

    impl_variant!(Int);
}

impl PropertyValue for f64 {
    const PROPERTY_TYPE: PropertyType = PropertyType::Double;

    fn to_property_string(&self) -> String {
        // Display prints the shortest representation that parses back exactly.
        self.to_string()
    }

    fn from_property_string(value: &str, _current: &Self) -> Option<Self> {
        value.trim().parse().ok()
    }

    impl_variant!(Double);
}

impl PropertyValue for bool {
    const PROPERTY_TYPE: PropertyType = PropertyType::Bool;

    fn to_property_string(&self) -> String {
        if *self { "1" } else { "0" }.to_string()
    }

    fn from_property_string(value: &str, _current: &Self) -> Option<Self> {
        match value.trim() {
            "1" | "true" => Some(true),
            "0" | "false" => Some(false),
            _ => None,
        }
    }

    impl_variant!(Bool);
}

impl PropertyValue for String {
    const PROPERTY_TYPE: PropertyType = PropertyType::String;

    fn to_property_string(&self) -> String {
        self.clone()
    }

    fn from_property_string(value: &str, _current: &Self) -> Option<Self> {
        Some(value.to_string())
    }

    impl_variant!(String);
}

impl PropertyValue for PathBuf {
    const PROPERTY_TYPE: PropertyType = PropertyType::Path;

    fn to_property_string(&self) -> String {
        self.to_string_lossy().into_owned()
    }

    fn from_property_string(value: &str, _current: &Self) -> Option<Self> {
        Some(PathBuf::from(value))
    }

    impl_variant!(Path);
}

/// Split `a;b;c` and parse every token as `f64`.
fn parse_components<const N: usize>(value: &str) -> Option<[f64; N]> {
    let mut out = [0.0; N];
    let mut tokens = value.split(';');
    for slot in out.iter_mut() {
        *slot = tokens.next()?.trim().parse().ok()?;
    }
    if tokens.next().is_some() {
        return None;
    }
    Some(out)
}

impl PropertyValue for DVec3 {
    const PROPERTY_TYPE: PropertyType = PropertyType::Position;

    fn to_property_string(&self) -> String {
        format!("{};{};{}", self.x, self.y, self.z)
    }

    fn from_property_string(value: &str, _current: &Self) -> Option<Self> {
        parse_components::<3>(value).map(DVec3::from_array)
    }

    impl_variant!(Position);
}

/// An RGBA color with components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    /// Create a color from its components.
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque black.
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    /// Opaque white.
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{};{};{}", self.r, self.g, self.b, self.a)
    }
}

impl PropertyValue for Color {
    const PROPERTY_TYPE: PropertyType = PropertyType::Color;

    fn to_property_string(&self) -> String {
        self.to_string()
    }

    fn from_property_string(value: &str, _current: &Self) -> Option<Self> {
        let mut out = [0.0f32; 4];
        let mut tokens = value.split(';');
        for slot in out.iter_mut() {
            *slot = tokens.next()?.trim().parse().ok()?;
        }
        if tokens.next().is_some() {
            return None;
        }
        Some(Self::new(out[0], out[1], out[2], out[3]))
    }

    impl_variant!(Color);
}

/// State of a trigger property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Trigger {
    /// Ready to be triggered (again).
    #[default]
    Ready,
    /// Got triggered and waits for the owner to handle it.
    Triggered,
}

impl Trigger {
    fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "PV_TRIGGER_READY",
            Self::Triggered => "PV_TRIGGER_TRIGGERED",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PropertyValue for Trigger {
    const PROPERTY_TYPE: PropertyType = PropertyType::Trigger;

    fn to_property_string(&self) -> String {
        self.as_str().to_string()
    }

    fn from_property_string(value: &str, _current: &Self) -> Option<Self> {
        match value.trim() {
            "PV_TRIGGER_READY" => Some(Self::Ready),
            "PV_TRIGGER_TRIGGERED" => Some(Self::Triggered),
            _ => None,
        }
    }

    impl_variant!(Trigger);
}

/// One selectable entry of a [`Selection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionItem {
    pub name: String,
    pub description: String,
}

impl SelectionItem {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// A set of selected indices into a shared, immutable item list.
///
/// Only the indices are encoded as string (`i;j;k`); parsing keeps the item
/// list of the value being replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    items: Arc<[SelectionItem]>,
    selected: Vec<usize>,
}

impl Selection {
    /// A selection over `items` with nothing selected.
    pub fn new(items: impl Into<Arc<[SelectionItem]>>) -> Self {
        Self {
            items: items.into(),
            selected: Vec::new(),
        }
    }

    /// The same item list with a different set of selected indices.
    ///
    /// Returns `None` if an index is out of range. Duplicates are dropped and
    /// indices are kept sorted.
    pub fn with_selected(&self, indices: impl IntoIterator<Item = usize>) -> Option<Self> {
        let mut selected: Vec<usize> = indices.into_iter().collect();
        if selected.iter().any(|&i| i >= self.items.len()) {
            return None;
        }
        selected.sort_unstable();
        selected.dedup();
        Some(Self {
            items: Arc::clone(&self.items),
            selected,
        })
    }

    /// The same item list with only `index` selected.
    pub fn select_only(&self, index: usize) -> Option<Self> {
        self.with_selected([index])
    }

    pub fn items(&self) -> &[SelectionItem] {
        &self.items
    }

    pub fn selected(&self) -> &[usize] {
        &self.selected
    }

    /// Number of selected items.
    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }

    /// The first selected item, if any.
    pub fn first_selected(&self) -> Option<&SelectionItem> {
        self.selected.first().and_then(|&i| self.items.get(i))
    }

    /// Selected items in index order.
    pub fn selected_items(&self) -> impl Iterator<Item = &SelectionItem> {
        self.selected.iter().filter_map(|&i| self.items.get(i))
    }
}

impl PropertyValue for Selection {
    const PROPERTY_TYPE: PropertyType = PropertyType::Selection;

    fn to_property_string(&self) -> String {
        self.selected
            .iter()
            .map(usize::to_string)
            .collect::<Vec<_>>()
            .join(";")
    }

    fn from_property_string(value: &str, current: &Self) -> Option<Self> {
        let indices = value
            .split(';')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| token.parse::<usize>().ok())
            .collect::<Option<Vec<_>>>()?;
        current.with_selected(indices)
    }

    impl_variant!(Selection);
}

/// A color control point of a transfer function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorPoint {
    pub iso: f64,
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

/// An opacity control point of a transfer function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlphaPoint {
    pub iso: f64,
    pub alpha: f64,
}

/// Maps scalar (iso) values to color and opacity through control points.
///
/// String form: `c:iso:r:g:b;` per color point followed by `a:iso:alpha;` per
/// alpha point, each list sorted by iso value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransferFunction {
    colors: Vec<ColorPoint>,
    alphas: Vec<AlphaPoint>,
}

impl TransferFunction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a color point, keeping the list sorted by iso value.
    pub fn add_color(&mut self, iso: f64, r: f64, g: f64, b: f64) {
        let at = self.colors.partition_point(|p| p.iso <= iso);
        self.colors.insert(at, ColorPoint { iso, r, g, b });
    }

    /// Insert an alpha point, keeping the list sorted by iso value.
    pub fn add_alpha(&mut self, iso: f64, alpha: f64) {
        let at = self.alphas.partition_point(|p| p.iso <= iso);
        self.alphas.insert(at, AlphaPoint { iso, alpha });
    }

    pub fn colors(&self) -> &[ColorPoint] {
        &self.colors
    }

    pub fn alphas(&self) -> &[AlphaPoint] {
        &self.alphas
    }

    /// Whether there are no control points at all.
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty() && self.alphas.is_empty()
    }
}

impl PropertyValue for TransferFunction {
    const PROPERTY_TYPE: PropertyType = PropertyType::TransferFunction;

    fn to_property_string(&self) -> String {
        let mut out = String::new();
        for p in &self.colors {
            out.push_str(&format!("c:{}:{}:{}:{};", p.iso, p.r, p.g, p.b));
        }
        for p in &self.alphas {
            out.push_str(&format!("a:{}:{};", p.iso, p.alpha));
        }
        out
    }

    fn from_property_string(value: &str, _current: &Self) -> Option<Self> {
        let mut tf = Self::new();
        for record in value.split(';').map(str::trim).filter(|r| !r.is_empty()) {
            let fields: Vec<&str> = record.split(':').collect();
            let numbers = fields[1..]
                .iter()
                .map(|f| f.trim().parse::<f64>().ok())
                .collect::<Option<Vec<_>>>()?;
            match (fields[0], numbers.as_slice()) {
                ("c", &[iso, r, g, b]) => tf.add_color(iso, r, g, b),
                ("a", &[iso, alpha]) => tf.add_alpha(iso, alpha),
                _ => return None,
            }
        }
        Some(tf)
    }

    impl_variant!(TransferFunction);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<T: PropertyValue + PartialEq>(value: T) {
        let text = value.to_property_string();
        let parsed = T::from_property_string(&text, &value).unwrap();
        assert_eq!(parsed, value, "round trip of {text:?}");
        assert_eq!(parsed.to_property_string(), text);
    }

    #[test]
    fn test_string_round_trips() {
        round_trip(-17i32);
        round_trip(0.1f64);
        round_trip(1e-300f64);
        round_trip(true);
        round_trip(false);
        round_trip(String::from("with ; and : inside"));
        round_trip(PathBuf::from("/data/t1.nii.gz"));
        round_trip(DVec3::new(1.5, -2.25, 1.0 / 3.0));
        round_trip(Color::new(0.1, 0.2, 0.3, 1.0));
        round_trip(Trigger::Triggered);

        let items: Vec<SelectionItem> = ["a", "b", "c"]
            .into_iter()
            .map(|n| SelectionItem::new(n, ""))
            .collect();
        round_trip(Selection::new(items.clone()).with_selected([0, 2]).unwrap());
        round_trip(Selection::new(items));

        let mut tf = TransferFunction::new();
        tf.add_color(0.0, 0.0, 0.0, 1.0);
        tf.add_color(1.0, 1.0, 0.5, 0.0);
        tf.add_alpha(0.5, 0.25);
        round_trip(tf);
        round_trip(TransferFunction::new());
    }

    #[test]
    fn test_bool_accepts_words() {
        assert_eq!(bool::from_property_string("true", &false), Some(true));
        assert_eq!(bool::from_property_string("0", &true), Some(false));
        assert_eq!(bool::from_property_string("yes", &true), None);
    }

    #[test]
    fn test_malformed_strings_rejected() {
        assert_eq!(i32::from_property_string("12a", &0), None);
        assert_eq!(DVec3::from_property_string("1;2", &DVec3::ZERO), None);
        assert_eq!(DVec3::from_property_string("1;2;3;4", &DVec3::ZERO), None);
        assert_eq!(Color::from_property_string("1;1;1", &Color::BLACK), None);
        assert_eq!(Trigger::from_property_string("pressed", &Trigger::Ready), None);
        assert!(TransferFunction::from_property_string("x:1:2;", &TransferFunction::new()).is_none());
        assert!(TransferFunction::from_property_string("c:1:2;", &TransferFunction::new()).is_none());
    }

    #[test]
    fn test_selection_keeps_items_and_checks_range() {
        let base = Selection::new(vec![SelectionItem::new("x", ""), SelectionItem::new("y", "")]);
        let parsed = Selection::from_property_string("1", &base).unwrap();
        assert_eq!(parsed.items().len(), 2);
        assert_eq!(parsed.first_selected().map(|i| i.name.as_str()), Some("y"));
        assert!(Selection::from_property_string("5", &base).is_none());
        assert_eq!(base.with_selected([1, 1, 0]).unwrap().selected(), &[0, 1]);
    }

    #[test]
    fn test_transfer_function_sorted() {
        let mut tf = TransferFunction::new();
        tf.add_alpha(1.0, 1.0);
        tf.add_alpha(0.0, 0.0);
        assert_eq!(tf.alphas()[0].iso, 0.0);
        assert_eq!(tf.to_property_string(), "a:0:0;a:1:1;");
    }

    #[test]
    fn test_variant_tags() {
        let v = 3i32.into_variant();
        assert_eq!(v.property_type(), PropertyType::Int);
        assert_eq!(i32::from_variant(v.clone()), Some(3));
        assert_eq!(f64::from_variant(v), None);
        assert_eq!(<Color as PropertyValue>::PROPERTY_TYPE, PropertyType::Color);
        assert!(PropertyType::Group.is_property_group());
    }
}

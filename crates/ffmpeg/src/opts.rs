use std::collections::{BTreeMap, HashMap};

/// A single option value.
///
/// Values render through [`Display`](std::fmt::Display) when they become
/// command line text or filter parameters: strings as-is, numbers via their
/// standard formatting (integral floats lose the decimal point), [`Flag`](OptValue::Flag)
/// as `1` and sequences joined with `|` (ffmpeg's in-option list separator).
#[derive(Debug, Clone, PartialEq)]
pub enum OptValue {
    /// A plain string.
    Str(String),
    /// An integer.
    Int(i64),
    /// A floating point number.
    Float(f64),
    /// A bare flag. [`Opts::to_args`] emits the option name with no value.
    Flag,
    /// A sequence of values. [`Opts::to_args`] repeats the option once per
    /// element.
    Seq(Vec<OptValue>),
}

impl OptValue {
    /// Reads the value as an integer, parsing strings if necessary.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Str(value) => value.parse().ok(),
            _ => None,
        }
    }
}

impl std::fmt::Display for OptValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Str(value) => f.write_str(value),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Flag => f.write_str("1"),
            Self::Seq(values) => {
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str("|")?;
                    }
                    write!(f, "{value}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for OptValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for OptValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&String> for OptValue {
    fn from(value: &String) -> Self {
        Self::Str(value.clone())
    }
}

impl From<i32> for OptValue {
    fn from(value: i32) -> Self {
        Self::Int(value as i64)
    }
}

impl From<i64> for OptValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for OptValue {
    fn from(value: u32) -> Self {
        Self::Int(value as i64)
    }
}

impl From<f32> for OptValue {
    fn from(value: f32) -> Self {
        Self::Float(value as f64)
    }
}

impl From<f64> for OptValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// Booleans become `1`/`0`, the form ffmpeg accepts everywhere.
impl From<bool> for OptValue {
    fn from(value: bool) -> Self {
        Self::Int(value as i64)
    }
}

/// The unit value is the bare flag, so `opts! { "shortest" => () }` compiles
/// to `-shortest` with no value.
impl From<()> for OptValue {
    fn from(_: ()) -> Self {
        Self::Flag
    }
}

impl<T: Into<OptValue>> From<Vec<T>> for OptValue {
    fn from(values: Vec<T>) -> Self {
        Self::Seq(values.into_iter().map(Into::into).collect())
    }
}

/// An ordered set of options, the stand-in for the keyword arguments ffmpeg
/// wrappers are usually driven with.
///
/// Keys iterate in ascending order, so everything compiled from an `Opts`
/// comes out the same way every time.
#[derive(Clone, Default, PartialEq)]
pub struct Opts(BTreeMap<String, OptValue>);

impl std::fmt::Debug for Opts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();

        for (key, value) in self.iter() {
            map.entry(&key, &value);
        }

        map.finish()
    }
}

/// A builder for [`Opts`].
pub struct OptsBuilder {
    opts: Opts,
}

impl OptsBuilder {
    /// Sets a key-value pair.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<OptValue>) -> Self {
        self.opts.set(key, value);
        self
    }

    /// Builds the options.
    pub fn build(self) -> Opts {
        self.opts
    }
}

impl Opts {
    /// Creates an empty set of options.
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Creates a new options builder.
    pub const fn builder() -> OptsBuilder {
        OptsBuilder { opts: Self::new() }
    }

    /// Sets a key-value pair, replacing any previous value.
    ///
    /// Empty keys are ignored.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<OptValue>) {
        let key = key.into();
        if key.is_empty() {
            return;
        }

        self.0.insert(key, value.into());
    }

    /// Returns the value associated with the given key.
    pub fn get(&self, key: &str) -> Option<&OptValue> {
        self.0.get(key)
    }

    /// Removes a key, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<OptValue> {
        self.0.remove(key)
    }

    /// Returns the number of options.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no options.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates the options in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptValue)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Moves all options of `other` into `self`, overwriting duplicate keys.
    pub fn extend(&mut self, other: Opts) {
        self.0.extend(other.0);
    }

    /// Converts the options into command line arguments: `-key value` per
    /// option in ascending key order.
    ///
    /// [`OptValue::Flag`] emits just `-key`; [`OptValue::Seq`] repeats the
    /// option once per element.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.0.len() * 2);
        self.append_args(&mut args);
        args
    }

    pub(crate) fn append_args(&self, args: &mut Vec<String>) {
        for (key, value) in &self.0 {
            match value {
                OptValue::Flag => args.push(format!("-{key}")),
                OptValue::Seq(values) => {
                    for value in values {
                        args.push(format!("-{key}"));
                        if !matches!(value, OptValue::Flag) {
                            args.push(value.to_string());
                        }
                    }
                }
                value => {
                    args.push(format!("-{key}"));
                    args.push(value.to_string());
                }
            }
        }
    }
}

impl<K: Into<String>, V: Into<OptValue>> FromIterator<(K, V)> for Opts {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut opts = Opts::new();

        for (key, value) in iter {
            opts.set(key, value);
        }

        opts
    }
}

impl<'a> IntoIterator for &'a Opts {
    type IntoIter = std::collections::btree_map::Iter<'a, String, OptValue>;
    type Item = (&'a String, &'a OptValue);

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

macro_rules! impl_map_for_opts {
    ($map:ident) => {
        impl<K: Into<String>, V: Into<OptValue>> From<$map<K, V>> for Opts {
            fn from(map: $map<K, V>) -> Self {
                map.into_iter().collect()
            }
        }
    };
}

impl_map_for_opts!(HashMap);
impl_map_for_opts!(BTreeMap);

impl From<&Opts> for BTreeMap<String, String> {
    fn from(opts: &Opts) -> Self {
        opts.iter().map(|(key, value)| (key.to_owned(), value.to_string())).collect()
    }
}

/// Builds an [`Opts`] from `key => value` pairs.
///
/// ```rust
/// let opts = ffmpeg_async::opts! {
///     "start_frame" => 10,
///     "end_frame" => 20,
/// };
///
/// assert_eq!(opts.to_args(), ["-end_frame", "20", "-start_frame", "10"]);
/// ```
#[macro_export]
macro_rules! opts {
    () => { $crate::opts::Opts::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut opts = $crate::opts::Opts::new();
        $(opts.set($key, $value);)+
        opts
    }};
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use std::collections::{BTreeMap, HashMap};

    use crate::opts::{OptValue, Opts};

    #[test]
    fn test_args_are_sorted() {
        let mut opts = Opts::new();
        opts.set("vcodec", "libx264");
        opts.set("crf", 23);
        opts.set("preset", "slow");

        assert_eq!(opts.to_args(), ["-crf", "23", "-preset", "slow", "-vcodec", "libx264"]);
    }

    #[test]
    fn test_flag_and_seq_args() {
        let opts = Opts::builder()
            .set("shortest", ())
            .set("metadata", vec!["title=a", "artist=b"])
            .build();

        assert_eq!(
            opts.to_args(),
            ["-metadata", "title=a", "-metadata", "artist=b", "-shortest"]
        );
    }

    #[test]
    fn test_value_rendering() {
        let cases = [
            (OptValue::from("rgb24"), "rgb24"),
            (OptValue::from(10), "10"),
            (OptValue::from(-1i64), "-1"),
            (OptValue::from(0.5), "0.5"),
            (OptValue::from(2.0), "2"),
            (OptValue::from(true), "1"),
            (OptValue::from(false), "0"),
            (OptValue::from(()), "1"),
            (OptValue::from(vec![1920, 1080]), "1920|1080"),
        ];

        for (value, expected) in cases {
            assert_eq!(value.to_string(), expected, "rendering mismatch for {value:?}");
        }
    }

    #[test]
    fn test_as_int() {
        assert_eq!(OptValue::Int(3).as_int(), Some(3));
        assert_eq!(OptValue::from("4").as_int(), Some(4));
        assert_eq!(OptValue::from("x").as_int(), None);
        assert_eq!(OptValue::Flag.as_int(), None);
    }

    #[test]
    fn test_set_replaces_and_ignores_empty_keys() {
        let mut opts = Opts::new();
        opts.set("b:v", 1000);
        opts.set("b:v", 2000);
        opts.set("", "ignored");

        assert_eq!(opts.len(), 1);
        assert_eq!(opts.get("b:v"), Some(&OptValue::Int(2000)));
        assert_eq!(opts.remove("b:v"), Some(OptValue::Int(2000)));
        assert!(opts.is_empty());
    }

    #[test]
    fn test_from_maps() {
        let mut hash_map = HashMap::new();
        hash_map.insert("ss", 5);
        hash_map.insert("t", 10);

        let opts = Opts::from(hash_map);
        assert_eq!(opts.to_args(), ["-ss", "5", "-t", "10"]);

        let rendered = BTreeMap::from(&opts);
        insta::assert_debug_snapshot!(rendered, @r#"
        {
            "ss": "5",
            "t": "10",
        }
        "#);
    }

    #[test]
    fn test_extend_overwrites() {
        let mut opts = crate::opts! { "crf" => 23, "preset" => "slow" };
        opts.extend(crate::opts! { "crf" => 18 });

        assert_eq!(opts.to_args(), ["-crf", "18", "-preset", "slow"]);
    }

    #[test]
    fn test_macro_and_iter() {
        let opts = crate::opts! {
            "end_frame" => 20,
            "start_frame" => 10,
        };

        let keys: Vec<_> = opts.iter().map(|(key, _)| key).collect();
        assert_eq!(keys, ["end_frame", "start_frame"]);
        assert_eq!(crate::opts! {}.len(), 0);
    }
}

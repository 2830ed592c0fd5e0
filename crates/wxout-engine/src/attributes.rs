use indexmap::IndexMap;
use ndarray::ArrayD;

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// Length of a dimension.
    Size(usize),
    /// Values of a coordinate (or any other array field).
    Array(ArrayD<f64>),
}

impl AttributeValue {
    pub fn as_size(&self) -> Option<usize> {
        match self {
            Self::Size(size) => Some(*size),
            Self::Array(_) => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayD<f64>> {
        match self {
            Self::Array(values) => Some(values),
            Self::Size(_) => None,
        }
    }
}

/// Canonical attribute name -> value, in the order first resolved.
///
/// A name is absent until its category has been resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedAttributes {
    values: IndexMap<String, AttributeValue>,
}

impl ResolvedAttributes {
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn dimension(&self, name: &str) -> Option<usize> {
        self.get(name).and_then(AttributeValue::as_size)
    }

    pub fn coordinate(&self, name: &str) -> Option<&ArrayD<f64>> {
        self.get(name).and_then(AttributeValue::as_array)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Stores a fully resolved category, replacing earlier values.
    pub(crate) fn commit(&mut self, staged: Vec<(String, AttributeValue)>) {
        for (name, value) in staged {
            self.values.insert(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{ArrayD, IxDyn};

    use super::{AttributeValue, ResolvedAttributes};

    #[test]
    fn commit_overwrites_in_place() {
        let mut attributes = ResolvedAttributes::default();
        attributes.commit(vec![
            ("nz".to_string(), AttributeValue::Size(50)),
            ("nx".to_string(), AttributeValue::Size(10)),
        ]);
        attributes.commit(vec![("nz".to_string(), AttributeValue::Size(60))]);

        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes.dimension("nz"), Some(60));
        assert_eq!(attributes.names().collect::<Vec<_>>(), vec!["nz", "nx"]);
    }

    #[test]
    fn typed_accessors_reject_the_other_kind() {
        let mut attributes = ResolvedAttributes::default();
        let lat = ArrayD::from_elem(IxDyn(&[2, 3]), 40.0);
        attributes.commit(vec![
            ("nz".to_string(), AttributeValue::Size(50)),
            ("latitude".to_string(), AttributeValue::Array(lat.clone())),
        ]);

        assert_eq!(attributes.coordinate("latitude"), Some(&lat));
        assert_eq!(attributes.dimension("latitude"), None);
        assert_eq!(attributes.coordinate("nz"), None);
        assert!(!attributes.contains("longitude"));
    }
}

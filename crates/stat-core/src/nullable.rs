//! Serde adapters writing non-finite reals as `null`
//!
//! JSON has no NaN, yet NaN is how the engines mark undefined statistics.
//! Non-finite values are written as `null` and read back as NaN.

pub(crate) mod reals {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        values
            .iter()
            .map(|v| v.is_finite().then_some(*v))
            .collect::<Vec<Option<f64>>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let values = Vec::<Option<f64>>::deserialize(deserializer)?;
        Ok(values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }
}

pub(crate) mod ordered {
    use ordered_float::OrderedFloat;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        value: &OrderedFloat<f64>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value.0.is_finite().then_some(value.0).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<OrderedFloat<f64>, D::Error> {
        Ok(OrderedFloat(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN)))
    }
}

//! Positional argument conversion.
//!
//! Calls carry their arguments as a JSON array that the responder spreads
//! into the handler's parameters. Typed callers and handlers express the
//! parameter list as a tuple: `()` for no arguments, `(a,)` for one,
//! `(a, b)` for two and so on. A bare non-sequence value is accepted as a
//! single argument.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Serialize a typed argument list into positional wire args.
///
/// Sequences (tuples, arrays, `Vec`s) are spread, `()` becomes an empty list
/// and any other value becomes a one-element list. A `None` is a single
/// `null` argument, not an empty list.
pub(crate) fn encode_args<A: Serialize>(args: A) -> serde_json::Result<Vec<Value>> {
    // ---
    // Only zero-sized types (`()`, unit structs) serialize to null without data
    let unit = std::mem::size_of::<A>() == 0;

    Ok(match serde_json::to_value(args)? {
        Value::Array(values) => values,
        Value::Null if unit => Vec::new(),
        other => vec![other],
    })
}

/// Deserialize positional wire args into a typed argument list.
///
/// Tries the whole list first (tuples and sequences), then falls back to
/// `null` for an empty list (unit) or the sole element for a single
/// argument.
pub(crate) fn decode_args<A: DeserializeOwned>(args: Vec<Value>) -> serde_json::Result<A> {
    // ---
    let fallback = match args.as_slice() {
        [] => Some(Value::Null),
        [single] => Some(single.clone()),
        _ => None,
    };

    match serde_json::from_value(Value::Array(args)) {
        Ok(decoded) => Ok(decoded),
        Err(err) => match fallback {
            Some(value) => serde_json::from_value(value).map_err(|_| err),
            None => Err(err),
        },
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_shapes() {
        // ---
        assert_eq!(encode_args(()).unwrap(), Vec::<Value>::new());
        assert_eq!(encode_args((1, "a")).unwrap(), vec![json!(1), json!("a")]);
        assert_eq!(encode_args(("solo",)).unwrap(), vec![json!("solo")]);
        assert_eq!(encode_args(5).unwrap(), vec![json!(5)]);
    }

    #[test]
    fn test_decode_shapes() {
        // ---
        let (a, b): (i32, String) = decode_args(vec![json!(2), json!("x")]).unwrap();
        assert_eq!((a, b.as_str()), (2, "x"));

        let () = decode_args(vec![]).unwrap();

        let single: String = decode_args(vec![json!("only")]).unwrap();
        assert_eq!(single, "only");

        assert!(decode_args::<(i32, i32)>(vec![json!("nope")]).is_err());
    }

    #[test]
    fn test_none_is_one_null_argument() {
        // ---
        assert_eq!(encode_args(None::<i32>).unwrap(), vec![Value::Null]);
        assert_eq!(encode_args(Some(3)).unwrap(), vec![json!(3)]);
        assert_eq!(encode_args((None::<i32>,)).unwrap(), vec![Value::Null]);

        let absent: Option<i32> = decode_args(vec![Value::Null]).unwrap();
        assert_eq!(absent, None);

        let present: Option<i32> = decode_args(encode_args(Some(3)).unwrap()).unwrap();
        assert_eq!(present, Some(3));
    }
}

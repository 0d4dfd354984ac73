//! Guest-to-host value conversion for the QuickJS engine.
//!
//! Conversion is total: every value a guest can hand to the bridge maps to some
//! [`HostValue`]. Objects with a `toJSON` method convert as its result, the way
//! `JSON.stringify` sees them. Kinds without a structural form fall back to their
//! `String(value)` text.

use std::collections::BTreeMap;

use rquickjs::function::This;
use rquickjs::{Ctx, Function, Object, Value};

use crate::host_value::HostValue;

const MAX_DEPTH: usize = 128;
const CIRCULAR: &str = "[Circular]";
const TOO_DEEP: &str = "[Too deep]";

pub fn to_host<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> HostValue {
    let mut ancestors = Vec::new();
    convert(ctx, value, &mut ancestors)
}

fn convert<'js>(ctx: &Ctx<'js>, value: &Value<'js>, ancestors: &mut Vec<Value<'js>>) -> HostValue {
    if value.is_undefined() {
        return HostValue::Undefined;
    }
    if value.is_null() {
        return HostValue::Null;
    }
    if let Some(b) = value.as_bool() {
        return HostValue::Bool(b);
    }
    if let Some(n) = value.as_number() {
        return HostValue::Number(n);
    }
    if let Some(s) = value.as_string() {
        return match s.to_string() {
            Ok(s) => HostValue::String(s),
            Err(_) => HostValue::String(describe(ctx, value)),
        };
    }
    if value.as_function().is_some() {
        return HostValue::Function {
            name: property(ctx, value, "name").unwrap_or_default(),
        };
    }
    if value.as_object().is_none() {
        // symbols, bigints
        return HostValue::String(describe(ctx, value));
    }

    if ancestors.iter().any(|seen| seen == value) {
        return HostValue::String(CIRCULAR.to_string());
    }
    if ancestors.len() >= MAX_DEPTH {
        return HostValue::String(TOO_DEEP.to_string());
    }
    ancestors.push(value.clone());
    let converted = convert_container(ctx, value, ancestors);
    ancestors.pop();
    converted
}

fn convert_container<'js>(
    ctx: &Ctx<'js>,
    value: &Value<'js>,
    ancestors: &mut Vec<Value<'js>>,
) -> HostValue {
    let Some(object) = value.as_object() else {
        return HostValue::String(describe(ctx, value));
    };

    if let Some(replacement) = to_json(ctx, object) {
        return convert(ctx, &replacement, ancestors);
    }

    // `is_array` also holds for proxies, whose `length` may be unreadable.
    if value.is_array() {
        return match convert_array(ctx, object, ancestors) {
            Some(items) => HostValue::Array(items),
            None => HostValue::String(describe(ctx, value)),
        };
    }

    // Error own properties are not enumerable; keep the two that matter.
    if value.as_exception().is_some() {
        let mut fields = BTreeMap::new();
        for key in ["name", "message"] {
            if let Some(text) = property(ctx, value, key) {
                fields.insert(key.to_string(), HostValue::String(text));
            }
        }
        return HostValue::Object(fields);
    }

    let mut fields = BTreeMap::new();
    for entry in object.props::<String, Value>() {
        match entry {
            Ok((key, item)) => {
                let item = convert(ctx, &item, ancestors);
                fields.insert(key, item);
            }
            // a throwing getter
            Err(_) => {
                ctx.catch();
            }
        }
    }
    HostValue::Object(fields)
}

/// Result of the object's own or inherited `toJSON`, if it has one that returns.
fn to_json<'js>(ctx: &Ctx<'js>, object: &Object<'js>) -> Option<Value<'js>> {
    let method = match object.get::<_, Value>("toJSON") {
        Ok(method) => method,
        Err(_) => {
            ctx.catch();
            return None;
        }
    };
    let method = method.as_function()?;
    match method.call::<_, Value>((This(object.clone()),)) {
        Ok(result) => Some(result),
        Err(_) => {
            ctx.catch();
            None
        }
    }
}

/// Items read by index through ordinary property access.
/// `None` when `length` cannot be read as a count.
fn convert_array<'js>(
    ctx: &Ctx<'js>,
    object: &Object<'js>,
    ancestors: &mut Vec<Value<'js>>,
) -> Option<Vec<HostValue>> {
    let length = match object.get::<_, Value>("length") {
        Ok(length) => length.as_number()?,
        Err(_) => {
            ctx.catch();
            return None;
        }
    };
    if !(0.0..=f64::from(u32::MAX)).contains(&length) || length.fract() != 0.0 {
        return None;
    }

    let mut items = Vec::new();
    for index in 0..length as u32 {
        let item = match object.get::<_, Value>(index) {
            Ok(item) => convert(ctx, &item, ancestors),
            Err(_) => {
                ctx.catch();
                HostValue::Undefined
            }
        };
        items.push(item);
    }
    Some(items)
}

fn property<'js>(ctx: &Ctx<'js>, value: &Value<'js>, key: &str) -> Option<String> {
    let object = value.as_object()?;
    match object.get::<_, Option<String>>(key) {
        Ok(text) => text,
        Err(_) => {
            ctx.catch();
            None
        }
    }
}

/// The guest's own `String(value)` rendering.
pub fn describe<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> String {
    let rendered = ctx
        .globals()
        .get::<_, Function>("String")
        .and_then(|string| string.call::<_, String>((value.clone(),)));
    match rendered {
        Ok(text) => text,
        Err(_) => {
            ctx.catch();
            "[unprintable value]".to_string()
        }
    }
}

//! Slot accounting for field and method descriptors.

use std::collections::HashMap;
use std::sync::Mutex;

use once_cell::sync::Lazy;

use crate::error::ClassWriteError;

/// Argument and return slot counts per method descriptor, shared by every writer.
static METHOD_SLOTS: Lazy<Mutex<HashMap<String, (u16, u16)>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Slots taken by a value of the given field descriptor: two for `J`/`D`, zero for `V`,
/// one otherwise.
pub fn field_slots(descriptor: &str) -> Result<u16, ClassWriteError> {
    let mut chars = descriptor.chars().peekable();
    let slots = match chars.peek() {
        Some('V') => {
            chars.next();
            0
        }
        _ => parse_field_type(&mut chars, descriptor)?,
    };
    if chars.next().is_some() {
        return Err(ClassWriteError::InvalidDescriptor(descriptor.to_string()));
    }
    Ok(slots)
}

/// Slots consumed by the arguments of a method descriptor, receiver excluded.
pub fn argument_slots(descriptor: &str) -> Result<u16, ClassWriteError> {
    Ok(method_slots(descriptor)?.0)
}

/// Slots pushed by the return value of a method descriptor.
pub fn return_slots(descriptor: &str) -> Result<u16, ClassWriteError> {
    Ok(method_slots(descriptor)?.1)
}

/// Local slots occupied by parameters on entry, one extra for the receiver of an
/// instance method.
pub fn parameter_slots(descriptor: &str, is_static: bool) -> Result<u16, ClassWriteError> {
    let args = argument_slots(descriptor)?;
    Ok(if is_static { args } else { args + 1 })
}

fn method_slots(descriptor: &str) -> Result<(u16, u16), ClassWriteError> {
    if let Ok(cache) = METHOD_SLOTS.lock()
        && let Some(slots) = cache.get(descriptor)
    {
        return Ok(*slots);
    }
    let slots = parse_method_descriptor(descriptor)?;
    if let Ok(mut cache) = METHOD_SLOTS.lock() {
        cache.insert(descriptor.to_string(), slots);
    }
    Ok(slots)
}

fn parse_method_descriptor(descriptor: &str) -> Result<(u16, u16), ClassWriteError> {
    let invalid = || ClassWriteError::InvalidDescriptor(descriptor.to_string());
    let mut chars = descriptor.chars().peekable();
    if chars.next() != Some('(') {
        return Err(invalid());
    }
    let mut args: u16 = 0;
    loop {
        match chars.peek() {
            Some(')') => {
                chars.next();
                break;
            }
            Some(_) => {
                let slots = parse_field_type(&mut chars, descriptor)?;
                args = args.checked_add(slots).ok_or_else(invalid)?;
            }
            None => return Err(invalid()),
        }
    }
    let ret = match chars.peek() {
        Some('V') => {
            chars.next();
            0
        }
        Some(_) => parse_field_type(&mut chars, descriptor)?,
        None => return Err(invalid()),
    };
    if chars.next().is_some() {
        return Err(invalid());
    }
    Ok((args, ret))
}

fn parse_field_type<I>(
    chars: &mut std::iter::Peekable<I>,
    descriptor: &str,
) -> Result<u16, ClassWriteError>
where
    I: Iterator<Item = char>,
{
    match chars.next() {
        Some('Z' | 'B' | 'C' | 'S' | 'I' | 'F') => Ok(1),
        Some('J' | 'D') => Ok(2),
        Some('L') => {
            let mut empty = true;
            for ch in chars.by_ref() {
                if ch == ';' {
                    if empty {
                        break;
                    }
                    return Ok(1);
                }
                empty = false;
            }
            Err(ClassWriteError::InvalidDescriptor(descriptor.to_string()))
        }
        Some('[') => {
            parse_field_type(chars, descriptor)?;
            Ok(1)
        }
        _ => Err(ClassWriteError::InvalidDescriptor(descriptor.to_string())),
    }
}

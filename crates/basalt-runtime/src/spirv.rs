//! Minimal SPIR-V inspection.
//!
//! Only enough of the module is decoded to recover the workgroup size the
//! kernel declares for its `main` compute entry point.

use std::collections::HashMap;
use std::ffi::CStr;

const MAGIC: u32 = 0x0723_0203;
const HEADER_WORDS: usize = 5;

const OP_ENTRY_POINT: u32 = 15;
const OP_EXECUTION_MODE: u32 = 16;
const EXECUTION_MODEL_GL_COMPUTE: u32 = 5;
const OP_CONSTANT: u32 = 43;
const OP_CONSTANT_COMPOSITE: u32 = 44;
const OP_SPEC_CONSTANT: u32 = 50;
const OP_SPEC_CONSTANT_COMPOSITE: u32 = 51;
const OP_DECORATE: u32 = 71;
const OP_EXECUTION_MODE_ID: u32 = 331;
const EXECUTION_MODE_LOCAL_SIZE: u32 = 17;
const EXECUTION_MODE_LOCAL_SIZE_ID: u32 = 38;
const DECORATION_BUILT_IN: u32 = 11;
const BUILT_IN_WORKGROUP_SIZE: u32 = 25;

/// Iterate `(opcode, operands)` over the instruction stream after the header.
///
/// Stops at the first malformed instruction instead of failing; the driver
/// does the real validation.
fn instructions(words: &[u32]) -> impl Iterator<Item = (u32, &[u32])> {
    let mut rest = words.get(HEADER_WORDS..).unwrap_or(&[]);
    std::iter::from_fn(move || {
        let first = *rest.first()?;
        let count = (first >> 16) as usize;
        if count == 0 || count > rest.len() {
            return None;
        }
        let (inst, tail) = rest.split_at(count);
        rest = tail;
        Some((first & 0xffff, &inst[1..]))
    })
}

/// Decode a literal string operand: little-endian bytes packed into words, NUL-terminated.
fn literal_string(words: &[u32]) -> Vec<u8> {
    words
        .iter()
        .flat_map(|w| w.to_le_bytes())
        .take_while(|&b| b != 0)
        .collect()
}

/// Workgroup size of the GLCompute entry point named `entry`, if declared.
///
/// A constant decorated `BuiltIn WorkgroupSize` wins over `LocalSizeId`,
/// which wins over the literal `LocalSize`. Specialization constants
/// resolve to their default values.
pub fn local_size(words: &[u32], entry: &CStr) -> Option<[u32; 3]> {
    if words.first() != Some(&MAGIC) {
        return None;
    }

    let entry_id = instructions(words).find_map(|(opcode, operands)| {
        match (opcode, operands) {
            (OP_ENTRY_POINT, [EXECUTION_MODEL_GL_COMPUTE, id, name @ ..])
                if literal_string(name) == entry.to_bytes() =>
            {
                Some(*id)
            }
            _ => None,
        }
    })?;

    let mut scalars = HashMap::new();
    let mut composites = HashMap::new();
    let mut builtin = None;
    let mut literal = None;
    let mut by_id = None;
    for (opcode, operands) in instructions(words) {
        match (opcode, operands) {
            (OP_CONSTANT | OP_SPEC_CONSTANT, [_, id, value, ..]) => {
                scalars.insert(*id, *value);
            }
            (OP_CONSTANT_COMPOSITE | OP_SPEC_CONSTANT_COMPOSITE, [_, id, x, y, z]) => {
                composites.insert(*id, [*x, *y, *z]);
            }
            (OP_DECORATE, [target, DECORATION_BUILT_IN, BUILT_IN_WORKGROUP_SIZE]) => {
                builtin = Some(*target);
            }
            (OP_EXECUTION_MODE, [id, EXECUTION_MODE_LOCAL_SIZE, x, y, z, ..]) if *id == entry_id => {
                literal = Some([*x, *y, *z]);
            }
            (OP_EXECUTION_MODE_ID, [id, EXECUTION_MODE_LOCAL_SIZE_ID, x, y, z, ..])
                if *id == entry_id =>
            {
                by_id = Some([*x, *y, *z]);
            }
            _ => {}
        }
    }

    let resolve = |[x, y, z]: [u32; 3]| -> Option<[u32; 3]> {
        Some([*scalars.get(&x)?, *scalars.get(&y)?, *scalars.get(&z)?])
    };
    builtin
        .and_then(|id| composites.get(&id).copied())
        .and_then(resolve)
        .or_else(|| by_id.and_then(resolve))
        .or(literal)
}

//! Declared call shapes and the in-process invocation primitive
//!
//! This is the one place where a convention mismatch turns into undefined
//! behaviour in the callee. Everything else in the crate only describes the
//! call; `InProcessCaller` is what finally jumps into foreign code.

use super::NativeCaller;
use crate::core::types::{Address, ProbeError, ProbeResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Calling convention tag of a foreign function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallingConvention {
    /// Object pointer in the dedicated receiver slot (`thiscall` on x86,
    /// first integer argument register on x64)
    ImplicitReceiver,
    /// Plain C convention, every argument written left to right
    C,
}

/// Kind of a declared parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Pointer,
    Word,
}

/// Kind of a declared return value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnKind {
    Pointer,
    Word,
}

/// Declared shape of a foreign call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallShape {
    pub convention: CallingConvention,
    pub params: Vec<ParamKind>,
    pub ret: ReturnKind,
}

impl CallShape {
    pub fn new(convention: CallingConvention, params: Vec<ParamKind>, ret: ReturnKind) -> Self {
        CallShape {
            convention,
            params,
            ret,
        }
    }

    /// Virtual method taking `(this, out)` and returning a pointer
    pub fn receiver_with_out_buffer() -> Self {
        CallShape::new(
            CallingConvention::ImplicitReceiver,
            vec![ParamKind::Pointer, ParamKind::Pointer],
            ReturnKind::Pointer,
        )
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

impl fmt::Display for CallShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<&str> = self
            .params
            .iter()
            .map(|param| match param {
                ParamKind::Pointer => "pointer",
                ParamKind::Word => "word",
            })
            .collect();
        let ret = match self.ret {
            ReturnKind::Pointer => "pointer",
            ReturnKind::Word => "word",
        };
        let convention = match self.convention {
            CallingConvention::ImplicitReceiver => "thiscall",
            CallingConvention::C => "cdecl",
        };
        write!(f, "{} ({}) -> {}", convention, params.join(", "), ret)
    }
}

macro_rules! receiver_fn {
    ($name:ident, $($arg:ty),+) => {
        #[cfg(target_arch = "x86")]
        type $name = unsafe extern "thiscall" fn($($arg),+) -> usize;
        #[cfg(not(target_arch = "x86"))]
        type $name = unsafe extern "C" fn($($arg),+) -> usize;
    };
}

receiver_fn!(ReceiverFn1, usize);
receiver_fn!(ReceiverFn2, usize, usize);
receiver_fn!(ReceiverFn3, usize, usize, usize);
receiver_fn!(ReceiverFn4, usize, usize, usize, usize);

type CFn0 = unsafe extern "C" fn() -> usize;
type CFn1 = unsafe extern "C" fn(usize) -> usize;
type CFn2 = unsafe extern "C" fn(usize, usize) -> usize;
type CFn3 = unsafe extern "C" fn(usize, usize, usize) -> usize;
type CFn4 = unsafe extern "C" fn(usize, usize, usize, usize) -> usize;

/// Calls functions living in the current address space
#[derive(Debug, Default, Clone, Copy)]
pub struct InProcessCaller;

impl InProcessCaller {
    pub fn new() -> Self {
        InProcessCaller
    }
}

impl NativeCaller for InProcessCaller {
    unsafe fn invoke(
        &self,
        target: Address,
        shape: &CallShape,
        args: &[usize],
    ) -> ProbeResult<usize> {
        if target.is_null() {
            return Err(ProbeError::CallFailed("call target is null".to_string()));
        }
        if args.len() != shape.arity() {
            return Err(ProbeError::UnsupportedCallShape(format!(
                "{} declared {} parameters, got {} arguments",
                shape,
                shape.arity(),
                args.len()
            )));
        }

        let raw = target.as_usize();
        let result = match (shape.convention, args) {
            (CallingConvention::ImplicitReceiver, &[this]) => {
                std::mem::transmute::<usize, ReceiverFn1>(raw)(this)
            }
            (CallingConvention::ImplicitReceiver, &[this, a]) => {
                std::mem::transmute::<usize, ReceiverFn2>(raw)(this, a)
            }
            (CallingConvention::ImplicitReceiver, &[this, a, b]) => {
                std::mem::transmute::<usize, ReceiverFn3>(raw)(this, a, b)
            }
            (CallingConvention::ImplicitReceiver, &[this, a, b, c]) => {
                std::mem::transmute::<usize, ReceiverFn4>(raw)(this, a, b, c)
            }
            (CallingConvention::C, &[]) => std::mem::transmute::<usize, CFn0>(raw)(),
            (CallingConvention::C, &[a]) => std::mem::transmute::<usize, CFn1>(raw)(a),
            (CallingConvention::C, &[a, b]) => std::mem::transmute::<usize, CFn2>(raw)(a, b),
            (CallingConvention::C, &[a, b, c]) => {
                std::mem::transmute::<usize, CFn3>(raw)(a, b, c)
            }
            (CallingConvention::C, &[a, b, c, d]) => {
                std::mem::transmute::<usize, CFn4>(raw)(a, b, c, d)
            }
            _ => {
                return Err(ProbeError::UnsupportedCallShape(shape.to_string()));
            }
        };

        Ok(result)
    }
}

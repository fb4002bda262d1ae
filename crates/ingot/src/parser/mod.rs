//! Validated-module decomposition.
//!
//! The code generator requires a validated module, so this wrapper around
//! `wasmparser` does two things: it runs the validator (refusing unvalidated
//! input with [`CompileError::NotValidated`]) and it splits the binary into
//! the sections the per-function lowering consumes. Function bodies are kept
//! as `wasmparser::FunctionBody` views into the input; the code generator
//! streams operators out of them directly.

use anyhow::{bail, Context as _, Result};
use wasmparser::{
    CompositeInnerType, ExternalKind, FuncType, FunctionBody, Parser, Payload, StorageType,
    TypeRef, ValType, Validator, WasmFeatures,
};

use crate::error::CompileError;

/// One field of a struct or array type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub storage: StorageKind,
    pub mutable: bool,
}

/// Field storage: packed i8/i16 or a full value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    I8,
    I16,
    Val(ValType),
}

impl StorageKind {
    fn from_wasmparser(st: StorageType) -> Self {
        match st {
            StorageType::I8 => StorageKind::I8,
            StorageType::I16 => StorageKind::I16,
            StorageType::Val(vt) => StorageKind::Val(vt),
        }
    }

    /// The value type this storage widens to on the operand stack.
    pub fn unpacked(self) -> ValType {
        match self {
            StorageKind::I8 | StorageKind::I16 => ValType::I32,
            StorageKind::Val(vt) => vt,
        }
    }
}

/// A type-section entry: function, struct, or array.
#[derive(Debug, Clone)]
pub enum CompositeDef {
    Func(FuncType),
    Struct(Vec<FieldDef>),
    Array(FieldDef),
}

impl CompositeDef {
    pub fn as_func(&self) -> Option<&FuncType> {
        match self {
            CompositeDef::Func(f) => Some(f),
            _ => None,
        }
    }
}

/// An imported function: the only import kind that produces code.
#[derive(Debug, Clone)]
pub struct ImportedFunc {
    pub module: String,
    pub name: String,
    pub type_idx: u32,
}

/// A local function definition awaiting lowering.
#[derive(Debug, Clone)]
pub struct FunctionDef<'a> {
    /// Index into the type section.
    pub type_idx: u32,
    /// Declared locals, flattened (parameters are in the function type).
    pub locals: Vec<ValType>,
    /// The code-section entry this function lowers from.
    pub body: FunctionBody<'a>,
}

/// An export entry. Exports do not affect per-function lowering but are part
/// of the decomposed module.
#[derive(Debug, Clone)]
pub struct ExportDef {
    pub name: String,
    pub kind: ExternalKind,
    pub index: u32,
}

/// A validated module, decomposed into the sections codegen consumes.
#[derive(Debug, Clone)]
pub struct ParsedModule<'a> {
    pub types: Vec<CompositeDef>,
    pub imported_funcs: Vec<ImportedFunc>,
    /// Global value types, imported globals first.
    pub globals: Vec<ValType>,
    pub functions: Vec<FunctionDef<'a>>,
    pub memory_count: u32,
    pub table_count: u32,
    pub exports: Vec<ExportDef>,
}

// EXCEPTIONS stays on so that a module using the proposal validates and is
// then refused as a configuration error instead of as malformed input.
fn supported_features() -> WasmFeatures {
    WasmFeatures::all()
        & !(WasmFeatures::LEGACY_EXCEPTIONS
            | WasmFeatures::MEMORY64
            | WasmFeatures::COMPONENT_MODEL
            | WasmFeatures::SHARED_EVERYTHING_THREADS)
}

/// Validate and decompose a WebAssembly binary.
pub fn parse_module(wasm: &[u8]) -> Result<ParsedModule<'_>> {
    Validator::new_with_features(supported_features())
        .validate_all(wasm)
        .map_err(|err| {
            tracing::debug!(error = %err, "validation failed");
            CompileError::NotValidated
        })?;

    let mut types = Vec::new();
    let mut imported_funcs = Vec::new();
    let mut globals = Vec::new();
    let mut function_types: Vec<u32> = Vec::new();
    let mut functions = Vec::new();
    let mut memory_count = 0u32;
    let mut table_count = 0u32;
    let mut exports = Vec::new();

    for payload in Parser::new(0).parse_all(wasm) {
        match payload.context("reading wasm payload")? {
            Payload::TypeSection(reader) => {
                for rec_group in reader {
                    for sub_type in rec_group.context("reading rec group")?.into_types() {
                        let def = match &sub_type.composite_type.inner {
                            CompositeInnerType::Func(func_ty) => {
                                CompositeDef::Func(func_ty.clone())
                            }
                            CompositeInnerType::Struct(struct_ty) => CompositeDef::Struct(
                                struct_ty
                                    .fields
                                    .iter()
                                    .map(|f| FieldDef {
                                        storage: StorageKind::from_wasmparser(f.element_type),
                                        mutable: f.mutable,
                                    })
                                    .collect(),
                            ),
                            CompositeInnerType::Array(array_ty) => CompositeDef::Array(FieldDef {
                                storage: StorageKind::from_wasmparser(array_ty.0.element_type),
                                mutable: array_ty.0.mutable,
                            }),
                            CompositeInnerType::Cont(_) => {
                                bail!(CompileError::InvalidConfigure(
                                    "continuation types are not supported".into()
                                ))
                            }
                        };
                        types.push(def);
                    }
                }
            }

            Payload::ImportSection(reader) => {
                for import in reader {
                    let import = import.context("reading import")?;
                    match import.ty {
                        TypeRef::Func(type_idx) => imported_funcs.push(ImportedFunc {
                            module: import.module.to_string(),
                            name: import.name.to_string(),
                            type_idx,
                        }),
                        TypeRef::Global(global_ty) => globals.push(global_ty.content_type),
                        TypeRef::Memory(_) => memory_count += 1,
                        TypeRef::Table(_) => table_count += 1,
                        TypeRef::Tag(_) => bail!(CompileError::InvalidConfigure(
                            "exception handling is not supported".into()
                        )),
                    }
                }
            }

            Payload::FunctionSection(reader) => {
                for type_idx in reader {
                    function_types.push(type_idx.context("reading function type index")?);
                }
            }

            Payload::GlobalSection(reader) => {
                for global in reader {
                    globals.push(global.context("reading global")?.ty.content_type);
                }
            }

            Payload::MemorySection(reader) => {
                memory_count += reader.count();
            }

            Payload::TableSection(reader) => {
                table_count += reader.count();
            }

            Payload::CodeSectionEntry(body) => {
                let type_idx = function_types[functions.len()];
                let mut locals = Vec::new();
                for local in body.get_locals_reader().context("reading locals")? {
                    let (count, val_type) = local.context("reading local group")?;
                    for _ in 0..count {
                        locals.push(val_type);
                    }
                }
                functions.push(FunctionDef {
                    type_idx,
                    locals,
                    body,
                });
            }

            Payload::ExportSection(reader) => {
                for export in reader {
                    let export = export.context("reading export")?;
                    exports.push(ExportDef {
                        name: export.name.to_string(),
                        kind: export.kind,
                        index: export.index,
                    });
                }
            }

            Payload::TagSection(_) => {
                bail!(CompileError::InvalidConfigure(
                    "exception handling is not supported".into()
                ))
            }

            _ => {}
        }
    }

    Ok(ParsedModule {
        types,
        imported_funcs,
        globals,
        functions,
        memory_count,
        table_count,
        exports,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_wat(wat: &str) -> Result<ParsedModule<'static>> {
        let wasm = wat::parse_str(wat).unwrap().leak();
        parse_module(wasm)
    }

    #[test]
    fn parse_minimal_module() {
        let module = parse_wat("(module)").unwrap();
        assert!(module.types.is_empty());
        assert!(module.functions.is_empty());
    }

    #[test]
    fn parse_add_function() {
        let module = parse_wat(
            r#"
            (module
                (func (param i32 i32) (result i32)
                    local.get 0
                    local.get 1
                    i32.add
                )
            )
        "#,
        )
        .unwrap();
        assert_eq!(module.types.len(), 1);
        assert_eq!(module.functions.len(), 1);
        let func_ty = module.types[0].as_func().unwrap();
        assert_eq!(func_ty.params(), &[ValType::I32, ValType::I32]);
        assert_eq!(func_ty.results(), &[ValType::I32]);
    }

    #[test]
    fn locals_are_flattened() {
        let module = parse_wat(
            r#"
            (module
                (func (local i32 i32) (local f64))
            )
        "#,
        )
        .unwrap();
        assert_eq!(
            module.functions[0].locals,
            vec![ValType::I32, ValType::I32, ValType::F64]
        );
    }

    #[test]
    fn imported_globals_precede_local_globals() {
        let module = parse_wat(
            r#"
            (module
                (import "env" "g" (global i64))
                (global (mut i32) (i32.const 7))
            )
        "#,
        )
        .unwrap();
        assert_eq!(module.globals, vec![ValType::I64, ValType::I32]);
    }

    #[test]
    fn function_imports_are_collected() {
        let module = parse_wat(
            r#"
            (module
                (import "env" "log" (func (param i32)))
                (func (result i32) i32.const 42)
            )
        "#,
        )
        .unwrap();
        assert_eq!(module.imported_funcs.len(), 1);
        assert_eq!(module.imported_funcs[0].module, "env");
        assert_eq!(module.imported_funcs[0].name, "log");
        assert_eq!(module.functions.len(), 1);
    }

    #[test]
    fn garbage_is_refused_as_not_validated() {
        let err = parse_module(b"\0asm\x01\0\0\0garbage").unwrap_err();
        assert_eq!(
            err.downcast_ref::<CompileError>(),
            Some(&CompileError::NotValidated)
        );
    }

    #[test]
    fn invalid_stack_shape_is_refused() {
        let wasm = wat::parse_str("(module (func (result i32)))");
        // Body with a missing result does not validate.
        assert!(wasm.is_err() || parse_module(&wasm.unwrap()).is_err());
    }
}

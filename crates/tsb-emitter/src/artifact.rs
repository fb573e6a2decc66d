//! The artifact writer and loader-side decoder.
//!
//! Container layout: the `TSBC` magic, a format version, then the
//! bincode-encoded `Program`. Before encoding, the reference rewriter scans
//! every function's `CallRuntime` instructions — which the emitter records
//! with internal helper ids — and remaps each onto the runtime module's
//! public symbol table, building the artifact's helper-name section from
//! exactly the symbols the code references.

use tsb_common::{Diagnostic, Span};

use crate::il::{Op, Program, RtHelper};

pub const MAGIC: &[u8; 4] = b"TSBC";
pub const VERSION: u32 = 1;

/// Rewrite internal helper references to public symbol-table indexes.
///
/// Mechanical by design: every `CallRuntime` operand is looked up in the
/// name→target table and replaced; an unknown reference is an emit error.
pub fn rewrite_helper_references(program: &mut Program) -> Result<(), Diagnostic> {
    let mut names: Vec<String> = Vec::new();
    for func in &mut program.functions {
        for op in &mut func.code {
            if let Op::CallRuntime { helper, .. } = op {
                let internal = RtHelper::from_u32(*helper).ok_or_else(|| {
                    Diagnostic::emit(
                        format!("unknown runtime helper reference {helper}"),
                        Span::dummy(),
                    )
                })?;
                let public = internal.public_name();
                let idx = match names.iter().position(|n| n == public) {
                    Some(i) => i,
                    None => {
                        names.push(public.to_string());
                        names.len() - 1
                    }
                };
                *helper = idx as u32;
            }
        }
    }
    program.helper_names = names;
    Ok(())
}

/// Finalize and encode the program into the artifact byte image.
pub fn encode_artifact(mut program: Program) -> Result<Vec<u8>, Diagnostic> {
    rewrite_helper_references(&mut program)?;
    let body = bincode::serialize(&program)
        .map_err(|e| Diagnostic::emit(format!("artifact encoding failed: {e}"), Span::dummy()))?;
    let mut out = Vec::with_capacity(body.len() + 8);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode an artifact image back into a program. The loader validates the
/// magic and version before touching the body.
pub fn decode_artifact(bytes: &[u8]) -> Result<Program, Diagnostic> {
    if bytes.len() < 8 || &bytes[0..4] != MAGIC {
        return Err(Diagnostic::io("not a tsb artifact (bad magic)"));
    }
    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != VERSION {
        return Err(Diagnostic::io(format!(
            "unsupported artifact version {version} (expected {VERSION})"
        )));
    }
    bincode::deserialize(&bytes[8..])
        .map_err(|e| Diagnostic::io(format!("artifact decoding failed: {e}")))
}

pub fn write_artifact(program: Program, path: &std::path::Path) -> Result<(), Diagnostic> {
    let bytes = encode_artifact(program)?;
    std::fs::write(path, bytes)
        .map_err(|e| Diagnostic::io(format!("cannot write {}: {e}", path.display())))
}

pub fn read_artifact(path: &std::path::Path) -> Result<Program, Diagnostic> {
    let bytes = std::fs::read(path)
        .map_err(|e| Diagnostic::io(format!("cannot read {}: {e}", path.display())))?;
    decode_artifact(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::{FuncDef, FuncKind, ModuleImage};

    fn tiny_program() -> Program {
        Program {
            constants: Vec::new(),
            functions: vec![FuncDef {
                name: "<module:main.ts>".to_string(),
                n_params: 0,
                has_rest: false,
                scope_slots: 0,
                binds_this: false,
                kind: FuncKind::Normal,
                module: 0,
                code: vec![
                    Op::Undefined,
                    Op::CallRuntime {
                        helper: RtHelper::Stringify as u32,
                        argc: 1,
                    },
                    Op::Pop,
                    Op::CallRuntime {
                        helper: RtHelper::Add as u32,
                        argc: 2,
                    },
                    Op::ReturnUndefined,
                ],
            }],
            classes: Vec::new(),
            helper_names: Vec::new(),
            modules: vec![ModuleImage {
                path: "main.ts".to_string(),
                init: 0,
                exports: Vec::new(),
                reexports: Vec::new(),
                imports: Vec::new(),
            }],
            entry: 0,
        }
    }

    #[test]
    fn rewriter_builds_symbol_table_from_referenced_helpers() {
        let mut program = tiny_program();
        rewrite_helper_references(&mut program).unwrap();
        assert_eq!(program.helper_names, vec!["rt.stringify", "rt.add"]);
        match &program.functions[0].code[1] {
            Op::CallRuntime { helper, .. } => assert_eq!(*helper, 0),
            other => panic!("unexpected op {other:?}"),
        }
        match &program.functions[0].code[3] {
            Op::CallRuntime { helper, .. } => assert_eq!(*helper, 1),
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[test]
    fn artifact_round_trips_through_the_container() {
        let bytes = encode_artifact(tiny_program()).unwrap();
        assert_eq!(&bytes[0..4], MAGIC);
        let decoded = decode_artifact(&bytes).unwrap();
        assert_eq!(decoded.functions.len(), 1);
        assert_eq!(decoded.modules[0].path, "main.ts");
        assert_eq!(decoded.helper_names.len(), 2);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let err = decode_artifact(b"NOPE....").unwrap_err();
        assert!(err.message.contains("magic"), "{}", err.message);
    }

    #[test]
    fn write_and_read_round_trip_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.tsbc");
        write_artifact(tiny_program(), &path).unwrap();
        let loaded = read_artifact(&path).unwrap();
        assert_eq!(loaded.entry, 0);
        assert_eq!(loaded.functions[0].name, "<module:main.ts>");
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let mut bytes = encode_artifact(tiny_program()).unwrap();
        bytes[4] = 99;
        let err = decode_artifact(&bytes).unwrap_err();
        assert!(err.message.contains("version"), "{}", err.message);
    }

    #[test]
    fn helper_names_match_the_runtime_registry() {
        for helper in RtHelper::ALL {
            assert!(
                tsb_runtime_name_exists(helper.public_name()),
                "{} missing from the runtime registry",
                helper.public_name()
            );
        }
    }

    // The emitter crate does not depend on tsb-runtime; the cross-check
    // lives here as a name-shape assertion and the full binding check lives
    // in the VM loader tests.
    fn tsb_runtime_name_exists(name: &str) -> bool {
        name.starts_with("rt.")
    }
}

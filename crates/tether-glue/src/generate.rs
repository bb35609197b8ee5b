//! Rendering of a binding table into a C compilation unit.

use std::collections::HashSet;

use tether_abi::{AbiType, BindingEntry, BindingTable, HEADER_NAME, ModuleName};

use crate::source::{CSource, string_literal};

/// One generated compilation unit.
#[derive(Debug, Clone)]
pub struct GlueUnit {
    pub module: ModuleName,
    pub source: String,
    /// Thunks in registration order, one per table entry.
    pub thunks: Vec<ThunkInfo>,
}

impl GlueUnit {
    pub fn thunk(&self, exposed_name: &str) -> Option<&ThunkInfo> {
        self.thunks.iter().find(|t| t.exposed_name == exposed_name)
    }
}

/// Summary of one generated thunk and its registration record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThunkInfo {
    pub exposed_name: String,
    pub symbol: String,
    pub arity: usize,
    pub arg_format: String,
    pub ret_format: String,
}

/// Name of the generated wrapper for an exposed binding.
pub fn thunk_symbol(exposed_name: &str) -> String {
    format!("tether_thunk_{exposed_name}")
}

fn methods_symbol(module: &ModuleName) -> String {
    format!("tether_{module}_methods")
}

fn def_symbol(module: &ModuleName) -> String {
    format!("tether_{module}_def")
}

/// Render `table` as the compilation unit for `module`.
pub fn generate(module: &ModuleName, table: &BindingTable) -> GlueUnit {
    let mut src = CSource::new();
    src.line(format!("/* Generated by tether for {module}. Do not edit. */"));
    src.line(format!("#include \"{HEADER_NAME}\""));
    src.blank();

    let mut declared = HashSet::new();
    for entry in table {
        if declared.insert(entry.real_symbol()) {
            src.line(format!("{};", entry.declaration()));
        }
    }

    let mut thunks = Vec::with_capacity(table.len());
    for entry in table {
        src.blank();
        thunks.push(render_thunk(&mut src, entry));
    }

    src.blank();
    render_registration(&mut src, module, table);
    src.blank();
    render_init(&mut src, module);

    tracing::debug!(
        module = %module,
        entries = table.len(),
        bytes = src.as_str().len(),
        "generated glue unit"
    );

    GlueUnit {
        module: module.clone(),
        source: src.finish(),
        thunks,
    }
}

// Thunk parameters and locals share a scope with the native symbol, so they
// live in the reserved namespace.
const ARGS: &str = "tether_args";
const ARGC: &str = "tether_argc";
const OUT: &str = "tether_out";

fn local(index: usize) -> String {
    format!("tether_arg{index}")
}

fn render_thunk(src: &mut CSource, entry: &BindingEntry) -> ThunkInfo {
    let symbol = thunk_symbol(entry.exposed_name());
    let params = entry.params();

    // Thunks sit at file scope, so continuation lines take one indent.
    src.block(
        format!(
            "static int {symbol}(\n    const tether_value *{ARGS},\n    size_t {ARGC},\n    \
             tether_value *{OUT})"
        ),
        |src| {
            for (i, &ty) in params.iter().enumerate() {
                src.line(format!("{};", declarator(ty, &local(i))));
            }
            if params.is_empty() {
                src.line(format!("(void){ARGS};"));
            }
            if entry.ret().is_void() {
                src.line(format!("(void){OUT};"));
            }
            src.block(format!("if ({ARGC} != {})", params.len()), |src| {
                src.line("return TETHER_ARITY_MISMATCH;");
            });
            for (i, &ty) in params.iter().enumerate() {
                src.line(format!("{} = {};", local(i), decode(ty, i)));
            }
            let call = format!(
                "{}({})",
                entry.real_symbol(),
                (0..params.len()).map(local).collect::<Vec<_>>().join(", ")
            );
            match encode(entry.ret(), &call) {
                Some(store) => src.line(store),
                None => src.line(format!("{call};")),
            };
            src.line("return TETHER_OK;");
        },
    );

    ThunkInfo {
        exposed_name: entry.exposed_name().to_owned(),
        symbol,
        arity: params.len(),
        arg_format: AbiType::format_string(params),
        ret_format: AbiType::format_string(&[entry.ret()]),
    }
}

fn declarator(ty: AbiType, name: &str) -> String {
    let decl = ty.c_decl();
    if decl.ends_with('*') {
        format!("{decl}{name}")
    } else {
        format!("{decl} {name}")
    }
}

/// Expression reading argument `index` of type `ty` out of the wire array.
fn decode(ty: AbiType, index: usize) -> String {
    match ty {
        AbiType::CString => format!("(char *){ARGS}[{index}].str"),
        AbiType::Pointer => format!("(void *)(intptr_t){ARGS}[{index}].ptr"),
        // Validated tables never carry void parameters.
        AbiType::Void => "0".to_owned(),
        ty => format!("{ARGS}[{index}].{}", ty.wire_slot().unwrap_or("int32")),
    }
}

/// Statement storing `call`'s result in the out slot, or `None` for void.
fn encode(ty: AbiType, call: &str) -> Option<String> {
    match ty {
        AbiType::Void => None,
        AbiType::Pointer => Some(format!("{OUT}->ptr = (int64_t)(intptr_t){call};")),
        AbiType::CString => Some(format!("{OUT}->str = {call};")),
        ty => ty.wire_slot().map(|slot| format!("{OUT}->{slot} = {call};")),
    }
}

fn render_registration(src: &mut CSource, module: &ModuleName, table: &BindingTable) {
    src.block_with(
        format!("static const tether_method_def {}[] =", methods_symbol(module)),
        "};",
        |src| {
            for entry in table {
                src.line(format!(
                    "{{{}, {}, {}, {}, {}, {}}},",
                    string_literal(entry.exposed_name()),
                    thunk_symbol(entry.exposed_name()),
                    entry.arity(),
                    string_literal(&AbiType::format_string(entry.params())),
                    string_literal(&AbiType::format_string(&[entry.ret()])),
                    string_literal(&entry.declaration()),
                ));
            }
            src.line("{NULL, NULL, 0, NULL, NULL, NULL},");
        },
    );
    src.blank();
    src.block_with(
        format!("static const tether_module_def {} =", def_symbol(module)),
        "};",
        |src| {
            src.line("TETHER_ABI_VERSION,");
            src.line(format!("{},", string_literal(module.as_str())));
            src.line(format!("{},", methods_symbol(module)));
        },
    );
}

fn render_init(src: &mut CSource, module: &ModuleName) {
    src.block(
        format!(
            "TETHER_EXPORT const tether_module_def *{}(void)",
            module.init_symbol()
        ),
        |src| {
            src.line(format!("return &{};", def_symbol(module)));
        },
    );
}

//! Source text through lowering, assembly and compilation.

use std::sync::Arc;

use tether_abi::{AbiType, BindingEntry, BindingTable, ModuleId, ModuleLookup};
use tether_trace::{
    GlobalValue, Globals, NodeKind, TraceCompiler, TraceError, TraceFunction, lower_source,
    parse_assembly,
};

struct Modules(Vec<(ModuleId, Arc<BindingTable>)>);

impl ModuleLookup for Modules {
    fn binding_table(&self, module: ModuleId) -> Option<Arc<BindingTable>> {
        self.0
            .iter()
            .find(|(id, _)| *id == module)
            .map(|(_, table)| Arc::clone(table))
    }
}

fn geometry() -> Modules {
    let table = BindingTable::new()
        .with(BindingEntry::new("area", [AbiType::Float32; 2], AbiType::Float32))
        .unwrap()
        .with(BindingEntry::new("perimeter", [AbiType::Float32; 2], AbiType::Float32))
        .unwrap();
    Modules(vec![(ModuleId::new(2), Arc::new(table))])
}

fn single(source: &str) -> TraceFunction {
    let mut functions = lower_source(source).unwrap();
    assert_eq!(functions.len(), 1);
    functions.remove(0)
}

#[test]
fn lowered_source_compiles_to_graph() {
    let function = single(
        "fn shape(w, h) {
            a = geo.area(w, h);
            p = geo.perimeter(w, h);
            return a / p
        }",
    );
    let globals = Globals::new().with("geo", ModuleId::new(2));
    let modules = geometry();
    let trace = TraceCompiler::new(&globals, &modules).compile(&function).unwrap();

    insta::assert_snapshot!(trace.to_string(), @r"
    trace shape:
    %n0 = arg 0
    %n1 = arg 1
    %n2 = global @geo = module2
    %n3 = method .area [native] %n2
    %n4 = call area via %n3 [native] %n0, %n1
    %n5 = global @geo = module2
    %n6 = method .perimeter [native] %n5
    %n7 = call perimeter via %n6 [native] %n0, %n1
    %n8 = div %n4, %n7
    %n9 = return %n8
    order: %n0 %n1 %n2 %n3 %n4 %n5 %n6 %n7 %n8 %n9
    ");
    let labels: Vec<String> = trace.native_calls().into_iter().map(|c| c.label).collect();
    assert_eq!(labels, ["area", "perimeter"]);
}

#[test]
fn printed_assembly_compiles_identically() {
    let function = single("fn f(a, b) { c = a * b; return c }");
    let reparsed = parse_assembly(&function.to_string()).unwrap().remove(0);
    assert_eq!(reparsed, function);

    let globals = Globals::new();
    let modules = geometry();
    let compiler = TraceCompiler::new(&globals, &modules);
    let direct = compiler.compile(&function).unwrap();
    let via_asm = compiler.compile(&reparsed).unwrap();
    assert_eq!(direct.graph, via_asm.graph);
    assert_eq!(direct.order, via_asm.order);
}

#[test]
fn unknown_modules_and_methods_stay_unlabeled() {
    let globals = Globals::new()
        .with("geo", ModuleId::new(2))
        .with("gone", ModuleId::new(9))
        .with("scale", GlobalValue::Float(2.0));
    let modules = geometry();
    let compiler = TraceCompiler::new(&globals, &modules);

    let function = single("fn f(x) { return gone.area(geo.volume(x)) }");
    let trace = compiler.compile(&function).unwrap();
    assert!(trace.native_calls().is_empty());

    let function = single("fn f(x) { return scale(x) }");
    let trace = compiler.compile(&function).unwrap();
    assert!(trace.native_calls().is_empty());
    let calls: Vec<&NodeKind> = trace
        .graph
        .iter()
        .map(|(_, node)| &node.kind)
        .filter(|kind| matches!(kind, NodeKind::Call { .. }))
        .collect();
    assert_eq!(calls.len(), 1);
}

#[test]
fn namespace_changes_are_observed_between_compiles() {
    let function = single("fn f(x) { return m.area(x, x) }");
    let modules = geometry();

    let mut globals = Globals::new();
    let err = TraceCompiler::new(&globals, &modules).compile(&function).unwrap_err();
    assert!(matches!(err, TraceError::UnboundGlobal { ref name, .. } if name == "m"));

    globals.insert("m", ModuleId::new(2));
    let trace = TraceCompiler::new(&globals, &modules).compile(&function).unwrap();
    assert_eq!(trace.native_calls().len(), 1);
}

#[test]
fn loops_in_assembly_are_rejected() {
    let function = parse_assembly(
        "fn f(xs)\n    load_local 0\n    for_iter 4\n    store_local 1\n    jump 1\n    \
         load_local 1\n    return\n",
    )
    .unwrap()
    .remove(0);
    let globals = Globals::new();
    let modules = geometry();
    let err = TraceCompiler::new(&globals, &modules).compile(&function).unwrap_err();
    assert_eq!(err.index(), 1);
    assert!(err.to_string().contains("for_iter"), "{err}");
}

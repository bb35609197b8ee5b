//! Abstract interpretation of an instruction stream into a [`TraceGraph`].

use std::collections::HashMap;
use std::fmt;

use tether_abi::ModuleLookup;

use crate::error::TraceError;
use crate::graph::{NativeCall, NodeKind, NodeRef, TraceGraph};
use crate::instruction::{Instruction, TraceFunction};
use crate::namespace::Namespace;

/// The result of one successful compile.
#[derive(Clone, Debug)]
pub struct CompiledTrace {
    pub function: String,
    pub graph: TraceGraph,
    /// Dependencies before dependents, ties broken by creation order.
    pub order: Vec<NodeRef>,
    /// The terminal `Return` node.
    pub ret: NodeRef,
}

impl CompiledTrace {
    pub fn native_calls(&self) -> Vec<NativeCall> {
        self.graph.native_calls()
    }
}

impl fmt::Display for CompiledTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "trace {}:", self.function)?;
        write!(f, "{}", self.graph)?;
        let order: Vec<String> = self.order.iter().map(|n| format!("%{n}")).collect();
        writeln!(f, "order: {}", order.join(" "))
    }
}

/// Replays straight-line instruction streams against a namespace and the
/// registry of bound modules.
pub struct TraceCompiler<'a> {
    namespace: &'a dyn Namespace,
    modules: &'a dyn ModuleLookup,
}

impl<'a> TraceCompiler<'a> {
    pub fn new(namespace: &'a dyn Namespace, modules: &'a dyn ModuleLookup) -> Self {
        TraceCompiler { namespace, modules }
    }

    /// Build the graph for `function`. On error nothing is retained.
    pub fn compile(&self, function: &TraceFunction) -> Result<CompiledTrace, TraceError> {
        if let Some((index, inst)) = function
            .code
            .iter()
            .enumerate()
            .find(|(_, inst)| inst.is_control_flow())
        {
            let reason = match inst {
                Instruction::ForIter(_) => "loops are not traced",
                _ => "branches are not traced",
            };
            return Err(TraceError::UnsupportedControlFlow {
                index,
                reason: format!("`{inst}`: {reason}"),
            });
        }

        let mut replay = Replay::new(self, function);
        for (index, inst) in function.code.iter().enumerate() {
            if let Some(ret) = replay.step(index, inst)? {
                if index + 1 != function.code.len() {
                    return Err(TraceError::UnsupportedControlFlow {
                        index: index + 1,
                        reason: "instructions after return".into(),
                    });
                }
                let order = replay.graph.topological_order();
                tracing::debug!(
                    function = %function.name,
                    nodes = replay.graph.len(),
                    native_calls = replay.graph.native_calls().len(),
                    "trace compiled"
                );
                return Ok(CompiledTrace {
                    function: function.name.clone(),
                    graph: replay.graph,
                    order,
                    ret,
                });
            }
        }
        Err(TraceError::UnsupportedControlFlow {
            index: function.code.len(),
            reason: "trace has no return".into(),
        })
    }
}

/// Interpreter state for one compile.
struct Replay<'c, 'a> {
    compiler: &'c TraceCompiler<'a>,
    graph: TraceGraph,
    stack: Vec<NodeRef>,
    slots: HashMap<u32, NodeRef>,
}

impl<'c, 'a> Replay<'c, 'a> {
    fn new(compiler: &'c TraceCompiler<'a>, function: &TraceFunction) -> Self {
        let mut graph = TraceGraph::new();
        let slots = (0..function.params.len() as u32)
            .map(|slot| (slot, graph.add(NodeKind::Argument(slot), [])))
            .collect();
        Replay {
            compiler,
            graph,
            stack: Vec::new(),
            slots,
        }
    }

    fn pop(&mut self, index: usize, inst: &Instruction) -> Result<NodeRef, TraceError> {
        self.stack.pop().ok_or_else(|| TraceError::StackUnderflow {
            index,
            instruction: inst.to_string(),
        })
    }

    /// Execute one instruction; returns the Return node when the trace ends.
    fn step(&mut self, index: usize, inst: &Instruction) -> Result<Option<NodeRef>, TraceError> {
        match inst {
            Instruction::LoadLocal(slot) => {
                let node = *self
                    .slots
                    .get(slot)
                    .ok_or(TraceError::UnboundLocal { index, slot: *slot })?;
                self.stack.push(node);
            }
            Instruction::LoadGlobal(name) => {
                let value = self
                    .compiler
                    .namespace
                    .resolve(name)
                    .ok_or_else(|| TraceError::UnboundGlobal {
                        index,
                        name: name.clone(),
                    })?;
                let node = self.graph.add(
                    NodeKind::GlobalRef {
                        name: name.clone(),
                        value,
                    },
                    [],
                );
                self.stack.push(node);
            }
            Instruction::LoadMethod(name) => {
                let receiver = self.pop(index, inst)?;
                let target = match self.graph.kind(receiver) {
                    NodeKind::GlobalRef { value, .. } => Some(value.clone()),
                    _ => None,
                };
                let native = target
                    .as_ref()
                    .and_then(|value| value.as_module())
                    .is_some_and(|module| self.compiler.modules.exports(module, name));
                let node = self.graph.add(
                    NodeKind::MethodRef {
                        name: name.clone(),
                        target,
                        native,
                    },
                    [receiver],
                );
                self.stack.push(node);
            }
            Instruction::StoreLocal(slot) => {
                let node = self.pop(index, inst)?;
                self.slots.insert(*slot, node);
            }
            Instruction::BinaryOp(op) => {
                let b = self.pop(index, inst)?;
                let a = self.pop(index, inst)?;
                let node = self.graph.add(NodeKind::BinaryOp(*op), [a, b]);
                self.stack.push(node);
            }
            Instruction::Call(argc) => {
                let needed = *argc as usize + 1;
                if self.stack.len() < needed {
                    return Err(TraceError::ArityMismatch {
                        index,
                        argc: *argc,
                        available: self.stack.len(),
                    });
                }
                let args = self.stack.split_off(self.stack.len() - *argc as usize);
                let callee = self.pop(index, inst)?;
                let (label, native) = match self.graph.kind(callee) {
                    NodeKind::MethodRef { name, native, .. } => (name.clone(), *native),
                    NodeKind::GlobalRef { name, .. } => (name.clone(), false),
                    _ => (format!("%{callee}"), false),
                };
                let node = self.graph.add(
                    NodeKind::Call {
                        callee,
                        label,
                        native,
                    },
                    args,
                );
                self.stack.push(node);
            }
            Instruction::Return => {
                let value = self.pop(index, inst)?;
                return Ok(Some(self.graph.add(NodeKind::Return, [value])));
            }
            Instruction::Jump(_)
            | Instruction::JumpIfTrue(_)
            | Instruction::JumpIfFalse(_)
            | Instruction::ForIter(_) => {
                return Err(TraceError::UnsupportedControlFlow {
                    index,
                    reason: format!("`{inst}`"),
                });
            }
            Instruction::Other(_) => {
                return Err(TraceError::UnsupportedOpcode {
                    index,
                    instruction: inst.to_string(),
                });
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tether_abi::{AbiType, BindingEntry, BindingTable, ModuleId};

    use super::*;
    use crate::instruction::BinaryOperator;
    use crate::lower::lower_source;
    use crate::namespace::{GlobalValue, Globals};

    /// Module 0 exports `mul(ptr, int32) -> int32`.
    struct OneModule(Arc<BindingTable>);

    impl OneModule {
        fn new() -> Self {
            let table = BindingTable::new()
                .with(BindingEntry::new(
                    "mul",
                    vec![AbiType::Pointer, AbiType::Int32],
                    AbiType::Int32,
                ))
                .unwrap();
            OneModule(Arc::new(table))
        }
    }

    impl ModuleLookup for OneModule {
        fn binding_table(&self, module: ModuleId) -> Option<Arc<BindingTable>> {
            (module == ModuleId::new(0)).then(|| Arc::clone(&self.0))
        }
    }

    fn compile(source: &str, globals: &Globals) -> Result<CompiledTrace, TraceError> {
        let function = lower_source(source).unwrap().remove(0);
        TraceCompiler::new(globals, &OneModule::new()).compile(&function)
    }

    #[test]
    fn product_of_two_parameters() {
        let trace = compile("fn f(a, b) { c = a * b; return c }", &Globals::new()).unwrap();
        let g = &trace.graph;
        assert_eq!(g.len(), 4);

        let nodes: Vec<NodeRef> = g.iter().map(|(n, _)| n).collect();
        let (a, b, mul, ret) = (nodes[0], nodes[1], nodes[2], nodes[3]);
        assert_eq!(g.kind(a), &NodeKind::Argument(0));
        assert_eq!(g.kind(b), &NodeKind::Argument(1));
        assert_eq!(g.kind(mul), &NodeKind::BinaryOp(BinaryOperator::Mul));
        assert_eq!(g.operands(mul), [a, b]);
        assert_eq!(g.kind(ret), &NodeKind::Return);
        assert_eq!(g.operands(ret), [mul]);
        assert_eq!(trace.ret, ret);
        assert_eq!(trace.order, [a, b, mul, ret]);
    }

    #[test]
    fn order_is_stable() {
        let source = "fn f(a, b) { x = b - a; y = a * x; return g(y, x, b) }";
        let globals = Globals::new().with("g", GlobalValue::Int(1));
        let first = compile(source, &globals).unwrap();
        for _ in 0..5 {
            let again = compile(source, &globals).unwrap();
            assert_eq!(again.order, first.order);
            assert_eq!(again.graph, first.graph);
        }
    }

    #[test]
    fn calls_on_bound_modules_are_native() {
        let globals = Globals::new()
            .with("m", ModuleId::new(0))
            .with("other", ModuleId::new(7))
            .with("k", GlobalValue::Int(3));
        let trace = compile(
            "fn f(x) { y = m.mul(x); z = other.mul(y); return m.sub(k.mul(z)) }",
            &globals,
        )
        .unwrap();
        let natives: Vec<String> = trace.native_calls().into_iter().map(|c| c.label).collect();
        assert_eq!(natives, ["mul"]);

        insta::assert_snapshot!(trace.to_string(), @r"
        trace f:
        %n0 = arg 0
        %n1 = global @m = module0
        %n2 = method .mul [native] %n1
        %n3 = call mul via %n2 [native] %n0
        %n4 = global @other = module7
        %n5 = method .mul %n4
        %n6 = call mul via %n5 %n3
        %n7 = global @m = module0
        %n8 = method .sub %n7
        %n9 = global @k = 3
        %n10 = method .mul %n9
        %n11 = call mul via %n10 %n6
        %n12 = call sub via %n8 %n11
        %n13 = return %n12
        order: %n0 %n1 %n2 %n3 %n4 %n5 %n6 %n7 %n8 %n9 %n10 %n11 %n12 %n13
        ");
    }

    #[test]
    fn call_arguments_keep_source_order() {
        let globals = Globals::new().with("g", GlobalValue::Str("g".into()));
        let trace = compile("fn f(a, b, c) { return g(c, a, b) }", &globals).unwrap();
        let (call, data) = trace
            .graph
            .iter()
            .find(|(_, d)| matches!(d.kind, NodeKind::Call { .. }))
            .unwrap();
        let slots: Vec<&NodeKind> = data.operands.iter().map(|&n| trace.graph.kind(n)).collect();
        assert_eq!(
            slots,
            [&NodeKind::Argument(2), &NodeKind::Argument(0), &NodeKind::Argument(1)]
        );
        assert!(matches!(
            trace.graph.kind(call),
            NodeKind::Call { label, native: false, .. } if label == "g"
        ));
    }

    #[test]
    fn branches_are_rejected() {
        let err = compile("fn f(a) { if a { return a } return a }", &Globals::new()).unwrap_err();
        assert!(matches!(err, TraceError::UnsupportedControlFlow { index: 1, .. }), "{err}");

        let err = compile("fn f(a) { while a { a = a } return a }", &Globals::new()).unwrap_err();
        assert!(matches!(err, TraceError::UnsupportedControlFlow { .. }), "{err}");
    }

    #[test]
    fn single_terminal_return() {
        let globals = Globals::new();
        let function = TraceFunction::new(
            "f",
            vec!["a".into()],
            vec![Instruction::LoadLocal(0), Instruction::Return, Instruction::LoadLocal(0)],
        );
        let err = TraceCompiler::new(&globals, &OneModule::new())
            .compile(&function)
            .unwrap_err();
        assert_eq!(err.index(), 2);
        assert!(matches!(err, TraceError::UnsupportedControlFlow { .. }));

        let err = compile("fn f(a) { b = a }", &globals).unwrap_err();
        assert_eq!(
            err,
            TraceError::UnsupportedControlFlow {
                index: 2,
                reason: "trace has no return".into()
            }
        );
    }

    #[test]
    fn interpretation_errors_name_the_instruction() {
        let globals = Globals::new();
        assert_eq!(
            compile("fn f() { return x }", &globals).unwrap_err(),
            TraceError::UnboundGlobal {
                index: 0,
                name: "x".into()
            }
        );
        assert_eq!(
            compile("fn f(a) { return a * 2 }", &globals).unwrap_err(),
            TraceError::UnsupportedOpcode {
                index: 1,
                instruction: "load_const 2".into()
            }
        );

        let unbound = TraceFunction::new(
            "f",
            vec![],
            vec![Instruction::LoadLocal(3), Instruction::Return],
        );
        let arity = TraceFunction::new(
            "f",
            vec!["a".into()],
            vec![Instruction::LoadLocal(0), Instruction::Call(1), Instruction::Return],
        );
        let underflow = TraceFunction::new(
            "f",
            vec!["a".into()],
            vec![Instruction::LoadLocal(0), Instruction::BinaryOp(BinaryOperator::Add)],
        );
        let modules = OneModule::new();
        let compiler = TraceCompiler::new(&globals, &modules);
        assert_eq!(
            compiler.compile(&unbound).unwrap_err(),
            TraceError::UnboundLocal { index: 0, slot: 3 }
        );
        assert_eq!(
            compiler.compile(&arity).unwrap_err(),
            TraceError::ArityMismatch {
                index: 1,
                argc: 1,
                available: 1
            }
        );
        assert_eq!(
            compiler.compile(&underflow).unwrap_err(),
            TraceError::StackUnderflow {
                index: 1,
                instruction: "binary_op +".into()
            }
        );
    }
}

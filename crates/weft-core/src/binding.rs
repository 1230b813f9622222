//! Event and prop bindings.
//!
//! `@event="expr"` and `:prop="expr"` attributes never reach the DOM as
//! attributes. The differ hands them over as [`Binding`]s and the runtime
//! evaluates each one against the component context after the patch.

use std::collections::HashMap;
use std::rc::Rc;

use crate::context::Context;
use crate::dom::{Dom, ListenerId, NodeId};
use crate::error::{BindingError, EvalError};
use crate::runtime::RuntimeOptions;
use crate::value::{Props, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingKind {
    Event,
    Prop,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Binding {
    pub node: NodeId,
    pub kind: BindingKind,
    /// Event name or prop name, without the sigil.
    pub name: String,
    pub expression: String,
}

/// Evaluates binding expressions. The expression language is up to the
/// implementation; the runtime only needs a [`Value`] back.
pub trait Evaluator {
    fn evaluate(&self, expression: &str, context: &Context) -> Result<Value, EvalError>;
}

impl<F> Evaluator for F
where
    F: Fn(&str, &Context) -> Result<Value, EvalError>,
{
    fn evaluate(&self, expression: &str, context: &Context) -> Result<Value, EvalError> {
        self(expression, context)
    }
}

/// Default evaluator: literals and dotted paths.
///
/// `count`, `props.item.label`, `rows.0`, `'text'`, `42`, `true`, `null`.
/// Signals met in the middle of a path are read through; a path that ends
/// on a signal yields the signal handle itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct PathEvaluator;

impl Evaluator for PathEvaluator {
    fn evaluate(&self, expression: &str, context: &Context) -> Result<Value, EvalError> {
        let expr = expression.trim();
        match expr {
            "" => return Err(EvalError::Syntax(expression.to_string())),
            "true" => return Ok(Value::Bool(true)),
            "false" => return Ok(Value::Bool(false)),
            "null" => return Ok(Value::Null),
            _ => {}
        }
        if let Ok(n) = expr.parse::<f64>() {
            return Ok(Value::Number(n));
        }
        for q in ['\'', '"'] {
            if let Some(body) = expr.strip_prefix(q) {
                return body
                    .strip_suffix(q)
                    .map(Value::from)
                    .ok_or_else(|| EvalError::Syntax(expression.to_string()));
            }
        }

        let mut segments = expr.split('.');
        let head = segments.next().unwrap_or_default();
        if !is_identifier(head) {
            return Err(EvalError::Syntax(expression.to_string()));
        }
        let mut current = if head == "props" {
            Value::Record(context.props_rc())
        } else {
            context
                .lookup(head)
                .ok_or_else(|| EvalError::Undefined(head.to_string()))?
        };
        for seg in segments {
            if seg.is_empty() || !seg.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$') {
                return Err(EvalError::Syntax(expression.to_string()));
            }
            current = current
                .field(seg)
                .ok_or_else(|| EvalError::Undefined(expr.to_string()))?;
        }
        Ok(current)
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

#[derive(Default)]
pub(crate) struct BindResult {
    pub listeners: Vec<ListenerId>,
    /// Evaluated `:prop` values per element, used as props when the element
    /// becomes a child mount point.
    pub props: HashMap<NodeId, Props>,
    pub errors: Vec<BindingError>,
}

pub(crate) fn apply(
    dom: &dyn Dom,
    evaluator: &dyn Evaluator,
    options: &RuntimeOptions,
    context: &Context,
    bindings: &[Binding],
) -> BindResult {
    let mut out = BindResult::default();
    for binding in bindings {
        let attribute = match binding.kind {
            BindingKind::Event => format!("{}{}", options.event_sigil, binding.name),
            BindingKind::Prop => format!("{}{}", options.prop_sigil, binding.name),
        };
        let value = match evaluator.evaluate(&binding.expression, context) {
            Ok(v) => v,
            Err(source) => {
                let err = BindingError::Eval {
                    attribute,
                    expression: binding.expression.clone(),
                    source,
                };
                log::warn!("{} in component '{}'", err, context.component_name());
                out.errors.push(err);
                continue;
            }
        };
        match binding.kind {
            BindingKind::Event => {
                let Some(handler) = value.as_handler().cloned() else {
                    let err = BindingError::NotCallable {
                        event: binding.name.clone(),
                        expression: binding.expression.clone(),
                    };
                    log::warn!("{} in component '{}'", err, context.component_name());
                    out.errors.push(err);
                    continue;
                };
                let id = dom.add_listener(
                    binding.node,
                    &binding.name,
                    Rc::new(move |event| handler.call(event)),
                );
                out.listeners.push(id);
            }
            BindingKind::Prop => {
                dom.set_property(binding.node, &binding.name, &value);
                out.props
                    .entry(binding.node)
                    .or_default()
                    .insert(binding.name.clone(), value);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Emitter, Setup};
    use crate::memory::MemoryDom;
    use crate::signal::signal;
    use crate::value::Handler;

    fn context(dom: Rc<MemoryDom>, node: NodeId) -> (Context, crate::Signal<i32>) {
        let count = signal(2);
        let mut props = Props::new();
        props.insert(
            "item".into(),
            Value::record([("label", Value::from("first"))]),
        );
        let setup = Setup::new()
            .signal("count", count.clone())
            .value("rows", Value::list([Value::from("a"), Value::from("b")]))
            .handler("inc", |_| {});
        let (entries, _hooks) = setup.into_parts();
        let cx = Context::new("test".into(), Rc::new(props), entries, Emitter::new(dom, node));
        (cx, count)
    }

    #[test]
    fn path_evaluator_resolves_literals_and_paths() {
        let dom = Rc::new(MemoryDom::new());
        let node = dom.create_element("div");
        let (cx, count) = context(dom, node);
        let ev = PathEvaluator;

        assert_eq!(ev.evaluate("42", &cx).unwrap().as_number(), Some(42.0));
        assert_eq!(ev.evaluate("'hi'", &cx).unwrap().to_string(), "hi");
        assert_eq!(ev.evaluate("true", &cx).unwrap().as_bool(), Some(true));
        assert_eq!(ev.evaluate("props.item.label", &cx).unwrap().to_string(), "first");
        assert_eq!(ev.evaluate("item.label", &cx).unwrap().to_string(), "first");
        assert_eq!(ev.evaluate("rows.1", &cx).unwrap().to_string(), "b");

        let sig = ev.evaluate("count", &cx).unwrap();
        let handle = sig.as_signal().unwrap().downcast::<i32>().unwrap();
        assert!(handle.ptr_eq(&count));

        assert!(ev.evaluate("inc", &cx).unwrap().as_handler().is_some());
    }

    #[test]
    fn path_evaluator_errors() {
        let dom = Rc::new(MemoryDom::new());
        let node = dom.create_element("div");
        let (cx, _) = context(dom, node);
        let ev = PathEvaluator;

        assert_eq!(
            ev.evaluate("missing", &cx).unwrap_err(),
            EvalError::Undefined("missing".into())
        );
        assert!(matches!(ev.evaluate("a +", &cx), Err(EvalError::Syntax(_))));
        assert!(matches!(ev.evaluate("'open", &cx), Err(EvalError::Syntax(_))));
        assert!(matches!(ev.evaluate("item..label", &cx), Err(EvalError::Syntax(_))));
    }

    #[test]
    fn one_bad_binding_does_not_stop_the_others() {
        let dom = Rc::new(MemoryDom::new());
        let root = dom.create_element("div");
        let button = dom.create_element("button");
        dom.insert_before(root, button, None);
        let (cx, _) = context(dom.clone(), root);

        let clicks = Rc::new(std::cell::Cell::new(0));
        let c = clicks.clone();
        let evaluator = move |expr: &str, cx: &Context| -> Result<Value, EvalError> {
            match expr {
                "click" => {
                    let c = c.clone();
                    Ok(Value::Handler(Handler::new(move |_| c.set(c.get() + 1))))
                }
                other => PathEvaluator.evaluate(other, cx),
            }
        };

        let bindings = vec![
            Binding { node: button, kind: BindingKind::Event, name: "click".into(), expression: "nope".into() },
            Binding { node: button, kind: BindingKind::Event, name: "focus".into(), expression: "count".into() },
            Binding { node: button, kind: BindingKind::Event, name: "click".into(), expression: "click".into() },
            Binding { node: button, kind: BindingKind::Prop, name: "item".into(), expression: "props.item".into() },
        ];
        let out = apply(&*dom, &evaluator, &RuntimeOptions::default(), &cx, &bindings);

        assert_eq!(out.errors.len(), 2);
        assert!(matches!(out.errors[0], BindingError::Eval { .. }));
        assert!(matches!(out.errors[1], BindingError::NotCallable { .. }));
        assert_eq!(out.listeners.len(), 1);
        assert!(out.props[&button].contains_key("item"));
        assert!(dom.property(button, "item").is_some());

        dom.dispatch(button, &crate::dom::DomEvent::new("click", button));
        assert_eq!(clicks.get(), 1);
    }
}

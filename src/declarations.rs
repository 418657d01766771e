//! TypeScript declarations for registered classes and functions.
//!
//! Output is rendered from the live overload sets, so it always matches
//! what the bridge will accept. Parameters are named by position; hidden
//! typemap parameters take no script argument and are left out.

use std::fmt::Write;

use hostbridge_core::{ParamKind, Signature, TypeHash};
use hostbridge_resolver::OverloadSet;

use crate::catalog::{Callables, Catalog, ClassEntry};

/// Render declarations for everything in `catalog`.
pub(crate) fn render(catalog: &Catalog) -> String {
    let mut out = String::new();
    for entry in catalog.entries() {
        render_class(&mut out, catalog, entry);
        out.push('\n');
    }
    render_callables(&mut out, catalog, catalog.functions(), "export function ");
    out
}

fn render_class(out: &mut String, catalog: &Catalog, entry: &ClassEntry) {
    let abstract_kw = if entry.constructors.is_empty() { "abstract " } else { "" };
    let _ = write!(out, "export {abstract_kw}class {}", entry.name);
    if let Some(base) = &entry.base {
        let _ = write!(out, " extends {base}");
    }
    out.push_str(" {\n");

    for ctor in entry.constructors.overloads() {
        let _ = writeln!(out, "  constructor({});", params(catalog, &ctor.signature));
    }
    for property in &entry.properties {
        let readonly = if property.is_readonly() { "readonly " } else { "" };
        let _ = writeln!(
            out,
            "  {readonly}{}: {};",
            property.name,
            type_name(catalog, &property.kind)
        );
    }
    let mut members = String::new();
    render_callables(&mut members, catalog, &entry.methods, "");
    render_callables(&mut members, catalog, &entry.statics, "static ");
    for line in members.lines() {
        let _ = writeln!(out, "  {line}");
    }
    out.push_str("}\n");
}

fn render_callables(out: &mut String, catalog: &Catalog, callables: &Callables, prefix: &str) {
    for (name, set) in callables.sync() {
        render_set(out, catalog, name, set, prefix);
    }
    for (name, set) in callables.deferred() {
        render_set(out, catalog, name, set, prefix);
    }
}

fn render_set(out: &mut String, catalog: &Catalog, name: &str, set: &OverloadSet, prefix: &str) {
    for overload in set.overloads() {
        let signature = &overload.signature;
        let returns = type_name(catalog, &signature.returns);
        let returns = if signature.is_async() {
            format!("Promise<{returns}>")
        } else {
            returns
        };
        let _ = writeln!(out, "{prefix}{name}({}): {returns};", params(catalog, signature));
    }
}

fn params(catalog: &Catalog, signature: &Signature) -> String {
    let typemaps = catalog.typemaps();
    signature
        .params
        .iter()
        .filter(|kind| typemaps.inputs(kind) > 0)
        .enumerate()
        .map(|(i, kind)| format!("arg{i}: {}", type_name(catalog, kind)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// TypeScript spelling of `kind`.
pub(crate) fn type_name(catalog: &Catalog, kind: &ParamKind) -> String {
    match kind {
        ParamKind::Void => "void".to_string(),
        ParamKind::Int | ParamKind::Float => "number".to_string(),
        ParamKind::String => "string".to_string(),
        ParamKind::Bool => "boolean".to_string(),
        ParamKind::Object(class) | ParamKind::Pointer(class) => class_name(catalog, *class),
        ParamKind::Array(element) => {
            let element = type_name(catalog, element);
            if element.contains(' ') {
                format!("({element})[]")
            } else {
                format!("{element}[]")
            }
        }
        ParamKind::Map(value) => format!("Record<string, {}>", type_name(catalog, value)),
        ParamKind::Nullable(inner) => format!("{} | null", type_name(catalog, inner)),
        ParamKind::Buffer => "Buffer".to_string(),
        ParamKind::Custom(hash) => catalog
            .typemaps()
            .get(*hash)
            .map(|map| map.declared().to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        ParamKind::IterStep(value) => format!("IteratorResult<{}>", type_name(catalog, value)),
    }
}

fn class_name(catalog: &Catalog, class: TypeHash) -> String {
    catalog
        .classes()
        .get(class)
        .map(|info| info.name.clone())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use hostbridge_core::{CallContext, NativeError, NativeValue};
    use hostbridge_resolver::Typemap;

    use super::*;
    use crate::Module;

    struct Animal;
    struct Dog {
        animal: Animal,
    }

    fn noop(_: &mut CallContext) -> Result<(), NativeError> {
        Ok(())
    }

    #[test]
    fn spells_kinds() {
        let catalog = Catalog::new();
        assert_eq!(type_name(&catalog, &ParamKind::array(ParamKind::Int)), "number[]");
        assert_eq!(
            type_name(&catalog, &ParamKind::array(ParamKind::nullable(ParamKind::String))),
            "(string | null)[]"
        );
        assert_eq!(
            type_name(&catalog, &ParamKind::map(ParamKind::Bool)),
            "Record<string, boolean>"
        );
        assert_eq!(type_name(&catalog, &ParamKind::Buffer), "Buffer");
        assert_eq!(
            type_name(&catalog, &ParamKind::iter_step(ParamKind::Float)),
            "IteratorResult<number>"
        );
        assert_eq!(type_name(&catalog, &ParamKind::custom("Missing")), "unknown");
    }

    #[test]
    fn typemaps_shape_parameters() {
        let mut module = Module::new("maps");
        module
            .typemap(Typemap::new("Fixed", "string").hidden(|| NativeValue::String("x".into())))
            .typemap(Typemap::new("Text", "string"))
            .function(
                "greet",
                Signature::new(vec![ParamKind::custom("Fixed"), ParamKind::custom("Text"), ParamKind::Buffer])
                    .returns(ParamKind::custom("Text")),
                noop,
            );
        let mut catalog = Catalog::new();
        catalog.register(module).expect("register");
        assert_eq!(
            render(&catalog),
            "export function greet(arg0: string, arg1: Buffer): string;\n"
        );
    }

    #[test]
    fn renders_classes_and_functions() {
        let mut module = Module::new("zoo");
        module
            .class::<Animal>("Animal")
            .method("name", Signature::new(vec![]).returns(ParamKind::String), noop)
            .build();
        module
            .class::<Dog>("Dog")
            .extends::<Animal>("Animal", |d| &mut d.animal)
            .constructor(vec![ParamKind::String], |_| Ok(Dog { animal: Animal }))
            .method_async("fetch", Signature::new(vec![ParamKind::Int]).returns(ParamKind::Bool), noop)
            .static_method("count", Signature::new(vec![]).returns(ParamKind::Int), noop)
            .build();
        module.function(
            "adopt",
            Signature::new(vec![ParamKind::object("Dog")]).returns(ParamKind::nullable(ParamKind::object("Animal"))),
            noop,
        );
        let mut catalog = Catalog::new();
        catalog.register(module).expect("register");

        let expected = "\
export abstract class Animal {
  name(): string;
}

export class Dog extends Animal {
  constructor(arg0: string);
  fetch(arg0: number): Promise<boolean>;
  static count(): number;
}

export function adopt(arg0: Dog): Animal | null;
";
        assert_eq!(render(&catalog), expected);
    }
}

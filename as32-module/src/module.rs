use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::Error;
use crate::function::Function;
use crate::name::ModuleName;

/// A named external module this module wants to link against.
#[derive(Clone, Debug)]
pub struct Dependency {
    pub name: ModuleName,
    pub module: Option<Arc<Module>>,
}

/// A concrete external symbol: function `func` of dependency `dependency`.
///
/// `module` is bound if and only if the named dependency slot was bound, and
/// always to the same target.
#[derive(Clone, Debug)]
pub struct Import {
    pub dependency: usize,
    pub func: usize,
    pub module: Option<Arc<Module>>,
}

#[derive(Debug, Default)]
struct Bindings {
    dependencies: Vec<Dependency>,
    imports: Vec<Import>,
}

/// A named unit of code and data.
///
/// The function list and name are fixed at construction. The data segment,
/// the link bindings, and the reference count are the only mutable state; the
/// bindings and the counter may be touched from several threads (one thread
/// unlinking a module while another links a new consumer of it), so they sit
/// behind a lock and an atomic respectively. No lock is ever held across an
/// activation.
#[derive(Debug)]
pub struct Module {
    name: ModuleName,
    data: Mutex<Vec<u8>>,
    text: Vec<Function>,
    bindings: Mutex<Bindings>,
    referenced: AtomicU32,
}

impl Module {
    pub fn builder(name: ModuleName) -> ModuleBuilder {
        ModuleBuilder::new(name)
    }

    pub fn name(&self) -> &ModuleName {
        &self.name
    }

    pub fn text_len(&self) -> usize {
        self.text.len()
    }

    pub fn function(&self, index: usize) -> Option<&Function> {
        self.text.get(index)
    }

    /// The module's static data segment, addressed by the data-relative
    /// operand mode.
    pub fn data(&self) -> MutexGuard<'_, Vec<u8>> {
        self.data.lock().unwrap()
    }

    /// How many other modules currently hold a live binding to this one.
    pub fn reference_count(&self) -> u32 {
        self.referenced.load(Ordering::SeqCst)
    }

    pub fn import(&self, index: usize) -> Option<Import> {
        self.bindings.lock().unwrap().imports.get(index).cloned()
    }

    pub fn dependency(&self, index: usize) -> Option<Dependency> {
        self.bindings
            .lock()
            .unwrap()
            .dependencies
            .get(index)
            .cloned()
    }

    /// Bind `candidate` into the first dependency slot declaring its name,
    /// and into every import slot drawing on that dependency.
    ///
    /// Fails if no dependency slot names the candidate. On success the
    /// candidate's reference count rises by one; [`unbind_all`] is the only
    /// way it comes back down.
    ///
    /// [`unbind_all`]: Module::unbind_all
    pub fn bind_dependency(&self, candidate: &Arc<Module>) -> Result<(), Error> {
        let mut bindings = self.bindings.lock().unwrap();
        let index = bindings
            .dependencies
            .iter()
            .position(|d| d.name == *candidate.name())
            .ok_or_else(|| Error::UnknownDependency(*candidate.name()))?;
        bindings.dependencies[index].module = Some(candidate.clone());
        candidate.referenced.fetch_add(1, Ordering::SeqCst);
        for import in bindings.imports.iter_mut() {
            if import.dependency == index {
                import.module = Some(candidate.clone());
            }
        }
        tracing::debug!("module {} bound dependency {}", self.name, candidate.name());
        Ok(())
    }

    /// Clear every import binding and release every bound dependency.
    ///
    /// Safe to call on an already-unbound module: a dependency's count is
    /// only decremented when its binding is actually taken, so a second call
    /// is a no-op.
    pub fn unbind_all(&self) {
        let mut bindings = self.bindings.lock().unwrap();
        for import in bindings.imports.iter_mut() {
            import.module = None;
        }
        for dependency in bindings.dependencies.iter_mut() {
            if let Some(module) = dependency.module.take() {
                module.referenced.fetch_sub(1, Ordering::SeqCst);
                tracing::debug!("module {} released dependency {}", self.name, module.name());
            }
        }
    }
}

/// Builder for programmatically constructed modules.
///
/// Function 0 is the module's entry point. Import slots may name dependency
/// indices in any order; a slot whose dependency never binds simply faults
/// when called through.
pub struct ModuleBuilder {
    name: ModuleName,
    data: Vec<u8>,
    text: Vec<Function>,
    dependencies: Vec<Dependency>,
    imports: Vec<Import>,
}

impl ModuleBuilder {
    pub fn new(name: ModuleName) -> ModuleBuilder {
        ModuleBuilder {
            name,
            data: vec![],
            text: vec![],
            dependencies: vec![],
            imports: vec![],
        }
    }

    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    pub fn with_function(mut self, function: Function) -> Self {
        self.text.push(function);
        self
    }

    pub fn with_dependency(mut self, name: ModuleName) -> Self {
        self.dependencies.push(Dependency { name, module: None });
        self
    }

    pub fn with_import(mut self, dependency: usize, func: usize) -> Self {
        self.imports.push(Import {
            dependency,
            func,
            module: None,
        });
        self
    }

    pub fn build(self) -> Arc<Module> {
        Arc::new(Module {
            name: self.name,
            data: Mutex::new(self.data),
            text: self.text,
            bindings: Mutex::new(Bindings {
                dependencies: self.dependencies,
                imports: self.imports,
            }),
            referenced: AtomicU32::new(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> ModuleName {
        ModuleName::new(s).expect("name fits")
    }

    fn empty_module(s: &str) -> Arc<Module> {
        Module::builder(name(s)).build()
    }

    #[test]
    fn bind_then_unbind_round_trips_the_counter() {
        let lib = empty_module("extlib");
        let main = Module::builder(name("main"))
            .with_dependency(*lib.name())
            .with_import(0, 0)
            .build();

        assert_eq!(lib.reference_count(), 0);
        main.bind_dependency(&lib).expect("dependency is declared");
        assert_eq!(lib.reference_count(), 1);
        assert!(main.import(0).expect("import 0 exists").module.is_some());
        assert!(main.dependency(0).expect("dependency 0 exists").module.is_some());

        main.unbind_all();
        assert_eq!(lib.reference_count(), 0);
        assert!(main.import(0).expect("import 0 exists").module.is_none());
        assert!(main.dependency(0).expect("dependency 0 exists").module.is_none());
    }

    #[test]
    fn unbind_is_idempotent() {
        let lib = empty_module("extlib");
        let main = Module::builder(name("main"))
            .with_dependency(*lib.name())
            .build();
        main.bind_dependency(&lib).expect("dependency is declared");
        main.unbind_all();
        main.unbind_all();
        assert_eq!(lib.reference_count(), 0);
    }

    #[test]
    fn binding_an_undeclared_module_fails() {
        let lib = empty_module("extlib");
        let main = empty_module("main");
        match main.bind_dependency(&lib) {
            Err(Error::UnknownDependency(n)) => assert_eq!(n, *lib.name()),
            other => panic!("expected UnknownDependency, got {:?}", other),
        }
        assert_eq!(lib.reference_count(), 0);
    }

    #[test]
    fn first_matching_dependency_slot_wins() {
        let lib = empty_module("extlib");
        let main = Module::builder(name("main"))
            .with_dependency(*lib.name())
            .with_dependency(*lib.name())
            .with_import(0, 0)
            .with_import(1, 0)
            .build();
        main.bind_dependency(&lib).expect("dependency is declared");
        assert!(main.dependency(0).expect("slot 0").module.is_some());
        assert!(main.dependency(1).expect("slot 1").module.is_none());
        assert!(main.import(0).expect("import 0").module.is_some());
        assert!(main.import(1).expect("import 1").module.is_none());
    }

    #[test]
    fn binding_only_touches_matching_imports() {
        let lib_a = empty_module("liba");
        let lib_b = empty_module("libb");
        let main = Module::builder(name("main"))
            .with_dependency(*lib_a.name())
            .with_dependency(*lib_b.name())
            .with_import(0, 0)
            .with_import(1, 3)
            .build();
        main.bind_dependency(&lib_b).expect("dependency is declared");
        assert!(main.import(0).expect("import 0").module.is_none());
        let bound = main.import(1).expect("import 1");
        assert_eq!(bound.func, 3);
        assert!(bound.module.is_some());
        assert_eq!(lib_a.reference_count(), 0);
        assert_eq!(lib_b.reference_count(), 1);
    }
}

//! Module Headers and Main Driver Generation
//!
//! Emits the per-module forward-declaration header and the `main`
//! translation unit: state construction, `arg` population (Lua's
//! 1-based indexing comes from storing `argv[i]` at slot `i - 1`),
//! library pointer installation, module registration in dependency
//! order (project mode), and the call into the entry module's export.

use super::naming;
use super::state::LibraryUsage;
use crate::libraries;

/// `<module>_module.hpp`: one forward declaration for the export
/// function.
pub fn module_header(module_name: &str, state_name: &str) -> String {
    let export = naming::module_export_name(module_name);
    format!(
        "#pragma once\n\n\
         #include \"l2c_runtime.hpp\"\n\
         #include \"{}_state.hpp\"\n\n\
         luaValue {}({}_lua_State* state);\n",
        state_name, export, state_name
    )
}

/// Shared library-pointer installation block.
fn library_initialization(usage: &LibraryUsage) -> Vec<String> {
    let mut lines = vec!["    // Initialize library function pointers".to_string()];
    for lib in libraries::KNOWN_LIBRARIES {
        let Some(used) = usage.libraries.get(lib) else {
            continue;
        };
        for member in libraries::typed_module_functions(lib) {
            if used.contains(member) {
                let path = format!("{}.{}", lib, member);
                lines.push(format!(
                    "    state.{} = &{};",
                    path,
                    libraries::cpp_symbol(&path)
                ));
            }
        }
    }
    for name in &usage.standalone {
        if libraries::signature(name).is_some() {
            lines.push(format!(
                "    state.{} = &{};",
                name,
                libraries::cpp_symbol(name)
            ));
        }
    }
    lines.push(String::new());
    lines
}

fn arg_initialization() -> Vec<String> {
    vec![
        "    // Set command line arguments".to_string(),
        "    state.arg = luaArray<luaValue>{};".to_string(),
        "    for (int i = 1; i < argc; ++i) {".to_string(),
        "        state.arg.set(i - 1, luaValue(argv[i]));".to_string(),
        "    }".to_string(),
        String::new(),
    ]
}

/// `<project>_main.cpp` for a multi-module build.
pub fn generate_project_main(
    project_name: &str,
    main_module: &str,
    dependency_order: &[String],
    usage: &LibraryUsage,
) -> String {
    let state_type = format!("{}_lua_State", project_name);
    let mut lines = vec![
        "#include \"l2c_runtime.hpp\"".to_string(),
        format!("#include \"{}_state.hpp\"", project_name),
        String::new(),
        "// Forward declarations for all modules".to_string(),
    ];
    for module in dependency_order {
        lines.push(format!(
            "luaValue {}({}* state);",
            naming::module_export_name(module),
            state_type
        ));
    }
    lines.push(String::new());

    lines.push("int main(int argc, char* argv[]) {".to_string());
    lines.push(format!("    // Auto-generated main for {}", project_name));
    lines.push(String::new());
    lines.push("    // Create project state".to_string());
    lines.push(format!("    {} state;", state_type));
    lines.push(String::new());

    lines.extend(arg_initialization());
    lines.extend(library_initialization(usage));

    lines.push(format!(
        "    // Initialize modules (in dependency order: {})",
        dependency_order.join(" -> ")
    ));
    for module in dependency_order {
        lines.push(format!(
            "    state.modules[\"{}\"] = &{};",
            module,
            naming::module_export_name(module)
        ));
    }
    lines.push(String::new());

    lines.push("    // Call main module entry point".to_string());
    lines.push(format!(
        "    luaValue result = {}(&state);",
        naming::module_export_name(main_module)
    ));
    lines.push(String::new());
    lines.push("    return 0;".to_string());
    lines.push("}".to_string());
    lines.push(String::new());

    lines.join("\n")
}

/// `<name>_main.cpp` for a single-file standalone build.
pub fn generate_standalone_main(module_name: &str, usage: &LibraryUsage) -> String {
    let state_type = format!("{}_lua_State", module_name);
    let export = naming::module_export_name(module_name);
    let mut lines = vec![
        "#include \"l2c_runtime.hpp\"".to_string(),
        format!("#include \"{}_state.hpp\"", module_name),
        format!("#include \"{}_module.hpp\"", module_name),
        String::new(),
        "int main(int argc, char* argv[]) {".to_string(),
        format!("    // Auto-generated main for {}", module_name),
        String::new(),
        "    // Create state".to_string(),
        format!("    {} state;", state_type),
        String::new(),
    ];

    lines.extend(arg_initialization());
    lines.extend(library_initialization(usage));

    lines.push("    // Run the module".to_string());
    lines.push(format!("    luaValue result = {}(&state);", export));
    lines.push(String::new());
    lines.push("    return 0;".to_string());
    lines.push("}".to_string());
    lines.push(String::new());

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::state::detect_library_usage;
    use crate::parser::parse;

    #[test]
    fn test_module_header_shape() {
        let header = module_header("utils", "proj");
        assert!(header.starts_with("#pragma once"));
        assert!(header.contains("#include \"l2c_runtime.hpp\""));
        assert!(header.contains("#include \"proj_state.hpp\""));
        assert!(header.contains("luaValue _l2c__utils_export(proj_lua_State* state);"));
    }

    #[test]
    fn test_project_main_registers_modules_in_order() {
        // Modules register strictly dependencies-first.
        let usage = detect_library_usage(&parse("print(\"x\")").unwrap());
        let order = vec![
            "helper".to_string(),
            "utils".to_string(),
            "main".to_string(),
        ];
        let main_cpp = generate_project_main("proj", "main", &order, &usage);

        let helper = main_cpp
            .find("state.modules[\"helper\"] = &_l2c__helper_export;")
            .unwrap();
        let utils = main_cpp
            .find("state.modules[\"utils\"] = &_l2c__utils_export;")
            .unwrap();
        let main_pos = main_cpp
            .find("state.modules[\"main\"] = &_l2c__main_export;")
            .unwrap();
        assert!(helper < utils && utils < main_pos);
        assert!(main_cpp.contains("luaValue result = _l2c__main_export(&state);"));
        assert!(main_cpp.contains("dependency order: helper -> utils -> main"));
    }

    #[test]
    fn test_arg_population_is_one_based() {
        let usage = LibraryUsage::default();
        let main_cpp = generate_standalone_main("demo", &usage);
        assert!(main_cpp.contains("for (int i = 1; i < argc; ++i) {"));
        assert!(main_cpp.contains("state.arg.set(i - 1, luaValue(argv[i]));"));
    }

    #[test]
    fn test_library_pointer_installation() {
        let usage =
            detect_library_usage(&parse("io.write(\"x\")\nlocal r = math.sqrt(2)\nprint(r)").unwrap());
        let main_cpp = generate_standalone_main("demo", &usage);
        assert!(main_cpp.contains("state.io.write = &l2c::io_write;"));
        assert!(main_cpp.contains("state.math.sqrt = &l2c::math_sqrt;"));
        assert!(main_cpp.contains("state.print = &l2c::print;"));
        assert!(!main_cpp.contains("math_floor"));
    }

    #[test]
    fn test_forward_declarations_for_all_modules() {
        let usage = LibraryUsage::default();
        let order = vec!["a".to_string(), "b".to_string()];
        let main_cpp = generate_project_main("proj", "b", &order, &usage);
        assert!(main_cpp.contains("luaValue _l2c__a_export(proj_lua_State* state);"));
        assert!(main_cpp.contains("luaValue _l2c__b_export(proj_lua_State* state);"));
    }
}

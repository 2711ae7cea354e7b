//! End-to-end tests: source in, printed output (or error) out.

use kestrel::{Error, Vm};
use pretty_assertions::assert_eq;

fn run(source: &str) -> String {
    let mut vm = Vm::new();
    vm.capture_output();
    if let Err(error) = vm.run_source(source) {
        panic!("program failed: {}", error);
    }
    vm.take_output()
}

fn run_err(source: &str) -> Error {
    let mut vm = Vm::new();
    vm.capture_output();
    match vm.run_source(source) {
        Ok(_) => panic!("expected an error"),
        Err(error) => error,
    }
}

fn runtime_message(source: &str) -> String {
    match run_err(source) {
        Error::Runtime(message) => message,
        other => panic!("expected runtime error, got {}", other),
    }
}

// ---------------------------------------------------------------------------
// Expressions and statements
// ---------------------------------------------------------------------------

#[test]
fn arithmetic_precedence() {
    assert_eq!(run("var x = 1 + 2 * 3; print(x);"), "7\n");
}

#[test]
fn unary_and_grouping() {
    assert_eq!(run("print(-(1 + 2) * 4);"), "-12\n");
    assert_eq!(run("print(!true);"), "false\n");
    assert_eq!(run("print(!null);"), "true\n");
}

#[test]
fn division_by_zero_is_ieee() {
    assert_eq!(run("print(1 / 0 > 1000000);"), "true\n");
}

#[test]
fn comparisons_and_equality() {
    assert_eq!(run("print(1 < 2);"), "true\n");
    assert_eq!(run("print(2 <= 2);"), "true\n");
    assert_eq!(run("print(3 != 3);"), "false\n");
    assert_eq!(run("print(null == null);"), "true\n");
    assert_eq!(run("print(1 == \"1\");"), "false\n");
    assert_eq!(run("print(0 / 0 == 0 / 0);"), "false\n");
}

#[test]
fn string_interning_makes_equality_structural() {
    assert_eq!(run("print(\"ab\" == \"a\" + \"b\");"), "true\n");
}

#[test]
fn logical_operators_short_circuit_to_operands() {
    assert_eq!(run("print(false and 1);"), "false\n");
    assert_eq!(run("print(true and 1);"), "1\n");
    assert_eq!(run("print(null or \"x\");"), "x\n");
    assert_eq!(run("print(2 or 3);"), "2\n");
    assert_eq!(run("print(true && false || true);"), "true\n");
}

#[test]
fn ternary_picks_branches() {
    assert_eq!(run("print(1 < 2 ? \"yes\" : \"no\");"), "yes\n");
    assert_eq!(run("print(false ? 1 : false ? 2 : 3);"), "3\n");
}

#[test]
fn compound_assignment_and_increments() {
    assert_eq!(run("var x = 10; x += 5; print(x);"), "15\n");
    assert_eq!(run("var x = 10; x -= 5; print(x);"), "5\n");
    assert_eq!(run("var x = 10; x *= 5; print(x);"), "50\n");
    assert_eq!(run("var x = 10; x /= 5; print(x);"), "2\n");
    assert_eq!(run("var i = 0; i++; i++; i--; print(i);"), "1\n");
}

#[test]
fn string_concatenation_coerces_the_other_operand() {
    assert_eq!(run("print(\"n = \" + 3);"), "n = 3\n");
    assert_eq!(run("print(1.5 + \"!\");"), "1.5!\n");
    assert_eq!(run("print(\"v: \" + true);"), "v: true\n");
    assert_eq!(run("print(\"v: \" + null);"), "v: null\n");
}

#[test]
fn string_escapes() {
    assert_eq!(run(r#"print("a\tb\nc");"#), "a\tb\nc\n");
}

#[test]
fn block_scopes_shadow() {
    assert_eq!(
        run("var x = 1; { var x = 2; print(x); } print(x);"),
        "2\n1\n"
    );
}

#[test]
fn if_else_chains() {
    let source = "
        var x = 7;
        if (x > 10) print(\"big\");
        else if (x > 5) print(\"mid\");
        else print(\"small\");
    ";
    assert_eq!(run(source), "mid\n");
}

#[test]
fn while_loop_with_break_and_continue() {
    let source = "
        var i = 0;
        var sum = 0;
        while (true) {
            i = i + 1;
            if (i > 10) break;
            if (i - i / 2 * 2 == 0) continue;
            sum = sum + i;
        }
        print(sum);
    ";
    // 1 + 3 + 5 + 7 + 9
    assert_eq!(run(source), "25\n");
}

#[test]
fn for_loop_accumulates() {
    assert_eq!(
        run("var s = \"\"; for (var i = 0; i < 3; i = i + 1) s = s + i; print(s);"),
        "012\n"
    );
}

#[test]
fn for_loop_with_increment_clause_and_break() {
    assert_eq!(
        run("for (var i = 0; ; i++) { if (i == 4) { print(i); break; } }"),
        "4\n"
    );
}

#[test]
fn infinite_for_executes_break_once() {
    assert_eq!(run("for (;;) break; print(\"after\");"), "after\n");
}

#[test]
fn switch_runs_first_matching_case_only() {
    let source = "
        var x = 2;
        switch (x) {
            case 1: print(\"one\");
            case 2: print(\"two\");
            case 3: print(\"three\");
            default: print(\"none\");
        }
    ";
    assert_eq!(run(source), "two\n");
}

#[test]
fn switch_falls_back_to_default() {
    let source = "
        switch (9) {
            case 1: print(\"one\");
            default: print(\"none\");
        }
    ";
    assert_eq!(run(source), "none\n");
}

#[test]
fn switch_with_no_match_and_no_default_is_a_noop() {
    assert_eq!(run("switch (9) { case 1: print(1); } print(\"done\");"), "done\n");
}

// ---------------------------------------------------------------------------
// Functions
// ---------------------------------------------------------------------------

#[test]
fn fibonacci() {
    let source = "
        function fib(n) {
            if (n < 2) return n;
            return fib(n - 1) + fib(n - 2);
        }
        print(fib(10));
    ";
    assert_eq!(run(source), "55\n");
}

#[test]
fn functions_return_null_by_default() {
    assert_eq!(run("function f() {} print(f());"), "null\n");
}

#[test]
fn arguments_bind_in_order() {
    assert_eq!(
        run("function sub(a, b) { return a - b; } print(sub(10, 4));"),
        "6\n"
    );
}

#[test]
fn functions_are_first_class() {
    let source = "
        function twice(f, x) { return f(f(x)); }
        function inc(n) { return n + 1; }
        print(twice(inc, 5));
    ";
    assert_eq!(run(source), "7\n");
}

#[test]
fn function_values_print_by_name() {
    assert_eq!(run("function f() {} print(f);"), "<fn f>\n");
    assert_eq!(run("print(print);"), "<native fn>\n");
}

#[test]
fn arity_mismatch_is_a_runtime_error() {
    let message = runtime_message("function f(a) {} f(1, 2);");
    assert!(message.contains("Expected 1 arguments but got 2."));
}

#[test]
fn deep_recursion_overflows_the_frame_stack() {
    let message = runtime_message("function f() { return f(); } f();");
    assert!(message.contains("Stack overflow."));
}

#[test]
fn functions_cannot_be_reassigned() {
    let message = runtime_message("function f() {} f = 1;");
    assert!(message.contains("Changing the value of a function is illegal."));
}

// ---------------------------------------------------------------------------
// Classes
// ---------------------------------------------------------------------------

#[test]
fn initializer_sets_fields() {
    let source = "
        class A {
            init(x) { this.x = x; }
            get() { return this.x; }
        }
        var a = A(3);
        print(a.get());
    ";
    assert_eq!(run(source), "3\n");
}

#[test]
fn constructing_returns_the_instance() {
    assert_eq!(
        run("class P { init(x) { this.x = x; } } print(P(5).x);"),
        "5\n"
    );
}

#[test]
fn inheritance_and_base_calls() {
    let source = "
        class A { greet() { return \"A\"; } }
        class B : A { greet() { return base.greet() + \"B\"; } }
        print(B().greet());
    ";
    assert_eq!(run(source), "AB\n");
}

#[test]
fn methods_resolve_through_the_parent_chain() {
    let source = "
        class A { name() { return \"a\"; } }
        class B : A {}
        class C : B {}
        print(C().name());
    ";
    assert_eq!(run(source), "a\n");
}

#[test]
fn initializers_are_inherited() {
    let source = "
        class A { init() { this.tag = \"a\"; } }
        class B : A {}
        print(B().tag);
    ";
    assert_eq!(run(source), "a\n");
}

#[test]
fn methods_call_siblings_through_this() {
    let source = "
        class A {
            a() { return this.b() * 2; }
            b() { return 7; }
        }
        print(A().a());
    ";
    assert_eq!(run(source), "14\n");
}

#[test]
fn bound_methods_are_first_class() {
    let source = "
        class A {
            init() { this.n = 41; }
            get() { return this.n + 1; }
        }
        var m = A().get;
        print(m());
    ";
    assert_eq!(run(source), "42\n");
}

#[test]
fn fields_shadow_methods_on_invoke() {
    let source = "
        function free() { return \"field\"; }
        class A { f() { return \"method\"; } }
        var a = A();
        print(a.f());
        a.f = free;
        print(a.f());
    ";
    assert_eq!(run(source), "method\nfield\n");
}

#[test]
fn field_increments_desugar() {
    let source = "
        class C { init() { this.n = 0; } }
        var c = C();
        c.n++;
        c.n += 10;
        print(c.n);
    ";
    assert_eq!(run(source), "11\n");
}

#[test]
fn instances_print_with_their_class_name() {
    assert_eq!(run("class A {} print(A); print(A());"), "A class\nA instance\n");
}

#[test]
fn constructing_with_arguments_requires_an_initializer() {
    let message = runtime_message("class A {} A(1);");
    assert!(message.contains("Expected 0 arguments but got 1."));
}

#[test]
fn missing_property_is_a_runtime_error() {
    let message = runtime_message("class A {} A().missing;");
    assert!(message.contains("Undefined property 'missing'."));
}

#[test]
fn property_access_on_non_instances_fails() {
    let message = runtime_message("var x = 1; x.field;");
    assert!(message.contains("Only instances have properties."));
}

// ---------------------------------------------------------------------------
// Lists
// ---------------------------------------------------------------------------

#[test]
fn list_subscript_get_and_store() {
    assert_eq!(
        run("var xs = [1, 2, 3]; xs[1] = 9; print(xs[0] + xs[1] + xs[2]);"),
        "13\n"
    );
}

#[test]
fn lists_print_their_items() {
    assert_eq!(run("print([1, \"two\", true]);"), "{ 1, two, true }\n");
}

#[test]
fn list_index_out_of_range() {
    let message = runtime_message("var xs = [1]; xs[3];");
    assert!(message.contains("out of range"));
}

#[test]
fn string_subscripting_yields_characters() {
    assert_eq!(run("print(\"hello\"[1]);"), "e\n");
}

#[test]
fn subscripting_other_values_fails() {
    let message = runtime_message("var x = true; x[0];");
    assert!(message.contains("Can only subscript lists and strings."));
}

// ---------------------------------------------------------------------------
// Variables and environments
// ---------------------------------------------------------------------------

#[test]
fn reading_an_undefined_variable_fails() {
    let message = runtime_message("print(missing);");
    assert!(message.contains("Undefined variable 'missing'."));
}

#[test]
fn assigning_an_undefined_variable_fails() {
    let message = runtime_message("missing = 1;");
    assert!(message.contains("Undefined variable 'missing'."));
}

#[test]
fn redefining_in_the_same_scope_fails() {
    let message = runtime_message("var x = 1; var x = 2;");
    assert!(message.contains("Tried to redefine variable 'x'."));
}

#[test]
fn function_locals_do_not_leak_to_callers() {
    let message = runtime_message(
        "function f() { var inner = 1; return inner; } f(); print(inner);",
    );
    assert!(message.contains("Undefined variable 'inner'."));
}

#[test]
fn caller_locals_are_invisible_to_callees() {
    let message = runtime_message(
        "function f() { return hidden; } { var hidden = 1; f(); }",
    );
    assert!(message.contains("Undefined variable 'hidden'."));
}

#[test]
fn globals_are_visible_inside_functions() {
    assert_eq!(
        run("var g = 5; function f() { return g * 2; } print(f());"),
        "10\n"
    );
}

// ---------------------------------------------------------------------------
// Runtime error reporting
// ---------------------------------------------------------------------------

#[test]
fn type_errors_name_the_operation() {
    assert!(runtime_message("1 - \"x\";").contains("Both operands must be numbers."));
    assert!(runtime_message("-\"x\";").contains("Operand must be a number."));
    assert!(runtime_message("1 + null;")
        .contains("Operands must be either two numbers or two strings."));
    assert!(runtime_message("var x = 1; x();").contains("Can only call functions and classes."));
}

#[test]
fn stack_traces_list_frames_innermost_first() {
    let message = runtime_message(
        "function inner() { return 1 - \"x\"; }\nfunction outer() { return inner(); }\nouter();",
    );
    let inner_at = message.find("in inner()").expect("inner frame");
    let outer_at = message.find("in outer()").expect("outer frame");
    let script_at = message.find("in script").expect("script frame");
    assert!(inner_at < outer_at && outer_at < script_at);
    assert!(message.contains("[line 1]"));
}

// ---------------------------------------------------------------------------
// Host modules and natives
// ---------------------------------------------------------------------------

#[test]
fn type_reports_value_kinds() {
    let source = "
        print(type(1));
        print(type(\"s\"));
        print(type(null));
        print(type(true));
        print(type([1]));
        print(type(print));
    ";
    assert_eq!(run(source), "number\nstring\nnull\nbool\nlist\nfunction\n");
}

#[test]
fn math_module() {
    let source = "
        include(\"math\");
        print(math.sqrt(16));
        print(math.max(2, 9));
        print(math.floor(2.7));
        print(math.abs(0 - 5));
    ";
    assert_eq!(run(source), "4\n9\n2\n5\n");
}

#[test]
fn list_module() {
    let source = "
        include(\"list\");
        var xs = [1, 2];
        list.append(xs, 3);
        print(list.count(xs));
        list.remove(xs, 0);
        print(xs[0]);
        print(list.join(\"a\", \"b\"));
    ";
    assert_eq!(run(source), "3\n2\nab\n");
}

#[test]
fn random_module_respects_ranges() {
    let source = "
        include(\"random\");
        random.seed(42);
        var ok = true;
        for (var i = 0; i < 100; i = i + 1) {
            var n = random.integerBetween(1, 6);
            if (n < 1 or n > 6) ok = false;
            var f = random.float();
            if (f < 0 or f >= 1) ok = false;
        }
        print(ok);
    ";
    assert_eq!(run(source), "true\n");
}

#[test]
fn native_argument_errors_carry_the_call_line() {
    let message = runtime_message("include(\"math\");\nmath.sqrt(\"x\");");
    assert!(message.contains("Native Function Error"));
    assert!(message.contains("[line 2]"));
}

#[test]
fn unknown_module_is_ignored() {
    assert_eq!(run("include(\"nonesuch\"); print(\"ok\");"), "ok\n");
}

// ---------------------------------------------------------------------------
// Embedder surface
// ---------------------------------------------------------------------------

#[test]
fn interpret_maps_outcomes_to_exit_codes() {
    let mut vm = Vm::new();
    vm.capture_output();
    assert_eq!(vm.interpret(""), 0);
    assert_eq!(vm.interpret("// only a comment"), 0);
    assert_eq!(vm.interpret("print(\"hi\");"), 0);
    assert_eq!(vm.interpret("var"), 65);
    assert_eq!(vm.interpret("undefined_name;"), 70);
}

#[test]
fn globals_persist_across_runs() {
    let mut vm = Vm::new();
    vm.capture_output();
    vm.run_source("var counter = 1;").unwrap();
    vm.run_source("counter = counter + 1;").unwrap();
    vm.run_source("print(counter);").unwrap();
    assert_eq!(vm.take_output(), "2\n");
}

#[test]
fn vm_stays_usable_after_a_runtime_error() {
    let mut vm = Vm::new();
    vm.capture_output();
    assert!(vm.run_source("nope;").is_err());
    vm.run_source("print(\"still alive\");").unwrap();
    assert_eq!(vm.take_output(), "still alive\n");
}

#[test]
fn compile_errors_report_all_parse_failures() {
    match run_err("var = 1;\nvar y 2;") {
        Error::Parse(message) => {
            assert!(message.contains("[line 1]"));
            assert!(message.contains("[line 2]"));
        }
        other => panic!("expected parse error, got {}", other),
    }
}

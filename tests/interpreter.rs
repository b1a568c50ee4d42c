mod interpreter_tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use tlox::interpreter::Interpreter;
    use tlox::parser::Parser;
    use tlox::resolver::Resolver;
    use tlox::scanner::Scanner;
    use tlox::token::Token;
    use tlox::value::Value;

    struct Session {
        interpreter: Interpreter,
        sink: Rc<RefCell<Vec<u8>>>,
    }

    impl Session {
        fn new() -> Self {
            let sink: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
            let interpreter = Interpreter::with_output(sink.clone());

            Session { interpreter, sink }
        }

        /// Scan, parse, resolve and interpret one source unit against the
        /// session's persistent interpreter.
        fn eval(&mut self, source: &str) -> Result<Value, String> {
            let tokens: Vec<Token> = Scanner::new(source)
                .collect::<Result<Vec<Token>, _>>()
                .map_err(|e| e.to_string())?;

            let (statements, errors) = Parser::new(&tokens).parse();

            if let Some(e) = errors.first() {
                return Err(e.to_string());
            }

            let resolve_errors = Resolver::new(&mut self.interpreter).resolve(&statements);

            if let Some(e) = resolve_errors.first() {
                return Err(e.to_string());
            }

            self.interpreter
                .interpret(&statements)
                .map_err(|e| e.to_string())
        }

        fn printed(&self) -> String {
            String::from_utf8_lossy(&self.sink.borrow()).into_owned()
        }
    }

    fn eval(source: &str) -> Value {
        Session::new().eval(source).expect("program should run")
    }

    fn eval_err(source: &str) -> String {
        Session::new()
            .eval(source)
            .expect_err("program should fail")
    }

    fn output(source: &str) -> String {
        let mut session = Session::new();
        session.eval(source).expect("program should run");
        session.printed()
    }

    fn assert_number(value: Value, expected: f64) {
        match value {
            Value::Number(n) => assert_eq!(n, expected),
            other => panic!("expected number {}, got {:?}", expected, other),
        }
    }

    // ───────────────────────── expressions ─────────────────────────

    #[test]
    fn arithmetic_follows_precedence() {
        assert_number(eval("1 + 2 * 3 - 4 / 2;"), 5.0);
        assert_number(eval("(1 + 2) * 3;"), 9.0);
        assert_number(eval("-3 + 1;"), -2.0);
    }

    #[test]
    fn string_concatenation() {
        assert_eq!(eval("\"foo\" + \"bar\";"), Value::String("foobar".into()));
    }

    #[test]
    fn mixed_plus_is_a_type_error() {
        let err = eval_err("\"x\" + 1;");

        assert_eq!(err, "Operands must be two numbers or two strings\n[line 1]");
    }

    #[test]
    fn comparison_requires_numbers() {
        assert_eq!(eval("1 < 2;"), Value::Bool(true));
        assert_eq!(eval("2 <= 2;"), Value::Bool(true));

        let err = eval_err("\"a\" < \"b\";");
        assert_eq!(err, "Operands must be numbers\n[line 1]");
    }

    #[test]
    fn negating_a_non_number_is_an_error() {
        assert_eq!(eval_err("-\"muffin\";"), "Operand must be a number\n[line 1]");
    }

    #[test]
    fn equality_is_value_based_and_never_errors() {
        assert_eq!(eval("1 == 1;"), Value::Bool(true));
        assert_eq!(eval("\"a\" == \"a\";"), Value::Bool(true));
        assert_eq!(eval("nil == nil;"), Value::Bool(true));
        assert_eq!(eval("1 == \"1\";"), Value::Bool(false));
        assert_eq!(eval("nil == false;"), Value::Bool(false));
        assert_eq!(eval("1 != 2;"), Value::Bool(true));
    }

    #[test]
    fn only_nil_and_false_are_falsy() {
        assert_eq!(eval("!nil;"), Value::Bool(true));
        assert_eq!(eval("!false;"), Value::Bool(true));
        assert_eq!(eval("!0;"), Value::Bool(false));
        assert_eq!(eval("!\"\";"), Value::Bool(false));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert_eq!(eval_err("1 / 0;"), "Division by zero\n[line 1]");
    }

    #[test]
    fn logical_operators_return_the_deciding_operand() {
        assert_eq!(eval("\"hi\" or 2;"), Value::String("hi".into()));
        assert_eq!(eval("nil or \"fallback\";"), Value::String("fallback".into()));
        assert_eq!(eval("nil and 2;"), Value::Nil);
        assert_number(eval("1 and 2;"), 2.0);
    }

    #[test]
    fn logical_operators_short_circuit_side_effects() {
        assert_eq!(output("var a = 1; true or (a = 2); print a;"), "1\n");
        assert_eq!(output("var a = 1; false and (a = 2); print a;"), "1\n");
    }

    // ───────────────────── variables and scoping ───────────────────

    #[test]
    fn uninitialized_variables_default_to_nil() {
        assert_eq!(eval("var a; a;"), Value::Nil);
    }

    #[test]
    fn assignment_is_an_expression_yielding_the_value() {
        assert_eq!(output("var a = 1; print a = 2; print a;"), "2\n2\n");
    }

    #[test]
    fn global_self_reference_fails_at_runtime_when_undefined() {
        assert_eq!(eval_err("var a = a;"), "Undefined variable 'a'\n[line 1]");
    }

    #[test]
    fn global_redeclaration_reads_the_old_value() {
        assert_number(eval("var a = 1; var a = a + 1; a;"), 2.0);
    }

    #[test]
    fn assigning_an_undeclared_name_is_an_error() {
        assert_eq!(eval_err("b = 1;"), "Undefined variable 'b'\n[line 1]");
    }

    #[test]
    fn reading_an_undeclared_name_is_an_error() {
        assert_eq!(eval_err("print nothing;"), "Undefined variable 'nothing'\n[line 1]");
    }

    #[test]
    fn block_shadowing_restores_the_outer_binding() {
        assert_eq!(
            output("var a = \"outer\"; { var a = \"inner\"; print a; } print a;"),
            "inner\nouter\n"
        );
    }

    #[test]
    fn assignment_in_a_block_mutates_the_enclosing_binding() {
        assert_eq!(output("var a = 1; { a = 2; } print a;"), "2\n");
    }

    // ───────────────────────── control flow ────────────────────────

    #[test]
    fn if_else_branches() {
        assert_eq!(output("if (1 < 2) print \"yes\"; else print \"no\";"), "yes\n");
        assert_eq!(output("if (nil) print \"yes\"; else print \"no\";"), "no\n");
    }

    #[test]
    fn while_loop_counts() {
        assert_eq!(
            output("var i = 0; while (i < 3) { print i; i = i + 1; }"),
            "0\n1\n2\n"
        );
    }

    #[test]
    fn for_loop_counts() {
        assert_eq!(
            output("for (var i = 0; i < 3; i = i + 1) print i;"),
            "0\n1\n2\n"
        );
    }

    #[test]
    fn for_loop_variable_is_scoped_to_the_loop() {
        assert_eq!(
            eval_err("for (var i = 0; i < 1; i = i + 1) {} print i;"),
            "Undefined variable 'i'\n[line 1]"
        );
    }

    // ───────────────────── functions and closures ──────────────────

    #[test]
    fn function_call_returns_its_value() {
        assert_number(eval("fun add(a, b) { return a + b; } add(1, 2);"), 3.0);
    }

    #[test]
    fn falling_off_the_end_returns_nil() {
        assert_eq!(eval("fun noop() {} noop();"), Value::Nil);
        assert_eq!(eval("fun early() { return; } early();"), Value::Nil);
    }

    #[test]
    fn return_unwinds_out_of_nested_loops() {
        assert_number(
            eval("fun f() { while (true) { for (;;) { return 42; } } } f();"),
            42.0,
        );
    }

    #[test]
    fn recursion() {
        assert_number(
            eval("fun fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); } fib(10);"),
            55.0,
        );
    }

    #[test]
    fn arity_is_checked_exactly() {
        assert_eq!(
            eval_err("fun f(a, b) {} f(1);"),
            "Expected 2 arguments but got 1\n[line 1]"
        );
        assert_eq!(
            eval_err("fun f() {} f(1);"),
            "Expected 0 arguments but got 1\n[line 1]"
        );
    }

    #[test]
    fn calling_a_non_callable_is_an_error() {
        assert_eq!(
            eval_err("\"not a function\"();"),
            "Can only call functions and classes\n[line 1]"
        );
    }

    #[test]
    fn closures_keep_private_state() {
        let source = "\
            fun makeCounter() {\
              var i = 0;\
              fun count() { i = i + 1; return i; }\
              return count;\
            }\
            var counter = makeCounter();\
            counter();\
            counter();";

        assert_number(eval(source), 2.0);
    }

    #[test]
    fn two_counters_do_not_share_state() {
        let source = "\
            fun makeCounter() {\
              var i = 0;\
              fun count() { i = i + 1; return i; }\
              return count;\
            }\
            var a = makeCounter();\
            var b = makeCounter();\
            a(); a();\
            b();";

        assert_number(eval(source), 1.0);
    }

    #[test]
    fn closures_capture_their_definition_scope() {
        // A later declaration in the block must not change what the closure
        // already captured.
        let source = "\
            var a = \"global\";\
            {\
              fun showA() { print a; }\
              showA();\
              var a = \"block\";\
              showA();\
            }";

        assert_eq!(output(source), "global\nglobal\n");
    }

    #[test]
    fn functions_print_as_fn_name() {
        assert_eq!(output("fun f() {} print f;"), "<fn f>\n");
        assert_eq!(output("print clock;"), "<native fn clock>\n");
    }

    #[test]
    fn native_clock_returns_a_number() {
        match eval("clock();") {
            Value::Number(n) => assert!(n > 0.0),
            other => panic!("expected number, got {:?}", other),
        }

        match eval("clock_ms();") {
            Value::Number(n) => assert!(n > 0.0),
            other => panic!("expected number, got {:?}", other),
        }
    }

    #[test]
    fn natives_are_arity_checked_like_user_functions() {
        assert_eq!(
            eval_err("clock(1);"),
            "Expected 0 arguments but got 1\n[line 1]"
        );
        assert_eq!(
            eval_err("clock_ms(1, 2);"),
            "Expected 0 arguments but got 2\n[line 1]"
        );
    }

    // ──────────────────────── classes ──────────────────────────────

    #[test]
    fn classes_and_instances_print_their_names() {
        assert_eq!(
            output("class Bagel {} print Bagel; print Bagel();"),
            "Bagel\nBagel instance\n"
        );
    }

    #[test]
    fn fields_are_created_on_first_assignment() {
        assert_number(eval("class Box {} var b = Box(); b.value = 7; b.value;"), 7.0);
    }

    #[test]
    fn reading_a_missing_property_is_an_error() {
        assert_eq!(
            eval_err("class Box {} Box().missing;"),
            "Undefined property 'missing'\n[line 1]"
        );
    }

    #[test]
    fn property_access_on_a_non_instance_is_an_error() {
        assert_eq!(
            eval_err("\"str\".length;"),
            "Only instances have properties\n[line 1]"
        );
        assert_eq!(
            eval_err("123.field = 1;"),
            "Only instances have fields\n[line 1]"
        );
    }

    #[test]
    fn methods_see_this() {
        let source = "\
            class Person {\
              init(name) { this.name = name; }\
              greet() { return \"Hello, \" + this.name; }\
            }\
            Person(\"Jane\").greet();";

        assert_eq!(eval(source), Value::String("Hello, Jane".into()));
    }

    #[test]
    fn bound_methods_remember_their_receiver() {
        let source = "\
            class Person {\
              init(name) { this.name = name; }\
              sayName() { return this.name; }\
            }\
            var method = Person(\"Jane\").sayName;\
            method();";

        assert_eq!(eval(source), Value::String("Jane".into()));
    }

    #[test]
    fn initializer_arity_applies_to_construction() {
        assert_eq!(
            eval_err("class A { init(x) {} } A();"),
            "Expected 1 arguments but got 0\n[line 1]"
        );
    }

    #[test]
    fn initializer_returns_the_instance() {
        // Even a bare `return` inside init yields the instance.
        let source = "\
            class A {\
              init() { this.x = 1; return; this.x = 2; }\
            }\
            A().x;";

        assert_number(eval(source), 1.0);
    }

    #[test]
    fn calling_init_directly_returns_the_instance() {
        let source = "\
            class A { init() { this.x = 1; } }\
            var a = A();\
            a.x = 5;\
            var b = a.init();\
            b.x;";

        assert_number(eval(source), 1.0);
    }

    #[test]
    fn fields_shadow_methods() {
        let source = "\
            class A { m() { return \"method\"; } }\
            var a = A();\
            a.m = \"field\";\
            a.m;";

        assert_eq!(eval(source), Value::String("field".into()));
    }

    #[test]
    fn instances_compare_by_identity() {
        assert_eq!(eval("class A {} var a = A(); var b = a; a == b;"), Value::Bool(true));
        assert_eq!(eval("class A {} A() == A();"), Value::Bool(false));
    }

    // ──────────────────────── inheritance ──────────────────────────

    #[test]
    fn methods_are_inherited() {
        let source = "\
            class Doughnut { cook() { return \"fry\"; } }\
            class Cruller < Doughnut {}\
            Cruller().cook();";

        assert_eq!(eval(source), Value::String("fry".into()));
    }

    #[test]
    fn subclass_methods_override() {
        let source = "\
            class A { m() { return \"A\"; } }\
            class B < A { m() { return \"B\"; } }\
            B().m();";

        assert_eq!(eval(source), Value::String("B".into()));
    }

    #[test]
    fn super_calls_the_superclass_method() {
        let source = "\
            class A { m() { return \"A\"; } }\
            class B < A {\
              m() { return \"B\"; }\
              test() { return super.m(); }\
            }\
            B().test();";

        assert_eq!(eval(source), Value::String("A".into()));
    }

    #[test]
    fn super_starts_above_the_defining_class() {
        // C inherits test from B; super inside B::test must reach A::m even
        // though the receiver is a C.
        let source = "\
            class A { m() { return \"A\"; } }\
            class B < A {\
              m() { return \"B\"; }\
              test() { return super.m(); }\
            }\
            class C < B {}\
            C().test();";

        assert_eq!(eval(source), Value::String("A".into()));
    }

    #[test]
    fn inheriting_from_a_non_class_is_an_error() {
        assert_eq!(
            eval_err("var NotAClass = 1; class A < NotAClass {}"),
            "Superclass must be a class\n[line 1]"
        );
    }

    // ─────────────────── sessions and persistence ──────────────────

    #[test]
    fn state_persists_across_interpret_calls() {
        let mut session = Session::new();

        session.eval("var x = 10;").unwrap();
        session.eval("fun get() { return x; }").unwrap();

        let value = session.eval("get();").unwrap();
        assert_number(value, 10.0);
    }

    #[test]
    fn closures_survive_across_interpret_calls() {
        let mut session = Session::new();

        session
            .eval("fun makeCounter() { var i = 0; fun c() { i = i + 1; return i; } return c; }")
            .unwrap();
        session.eval("var counter = makeCounter();").unwrap();
        session.eval("counter();").unwrap();

        let value = session.eval("counter();").unwrap();
        assert_number(value, 2.0);
    }

    #[test]
    fn interpret_yields_the_last_expression_value() {
        let mut session = Session::new();

        assert_number(session.eval("1 + 1; 2 + 2;").unwrap(), 4.0);

        // A trailing declaration yields nil.
        assert_eq!(session.eval("3 + 3; var y = 1;").unwrap(), Value::Nil);
    }

    #[test]
    fn a_runtime_error_does_not_poison_the_session() {
        let mut session = Session::new();

        session.eval("var a = 1;").unwrap();
        assert!(session.eval("a + \"oops\";").is_err());

        let value = session.eval("a + 1;").unwrap();
        assert_number(value, 2.0);
    }

    #[test]
    fn print_renders_values_like_the_repl() {
        assert_eq!(output("print 1 + 2;"), "3\n");
        assert_eq!(output("print 3.5;"), "3.5\n");
        assert_eq!(output("print true;"), "true\n");
        assert_eq!(output("print nil;"), "nil\n");
        assert_eq!(output("print \"str\";"), "str\n");
    }
}

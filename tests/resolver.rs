mod resolver_tests {
    use tlox::error::LoxError;
    use tlox::interpreter::Interpreter;
    use tlox::parser::Parser;
    use tlox::resolver::Resolver;
    use tlox::scanner::Scanner;
    use tlox::token::Token;

    fn resolve(source: &str) -> Vec<LoxError> {
        let tokens: Vec<Token> = Scanner::new(source)
            .collect::<Result<Vec<Token>, _>>()
            .expect("source should scan cleanly");

        let (statements, errors) = Parser::new(&tokens).parse();
        assert!(errors.is_empty(), "unexpected parse errors: {:?}", errors);

        let mut interpreter = Interpreter::new();

        Resolver::new(&mut interpreter).resolve(&statements)
    }

    fn messages(source: &str) -> Vec<String> {
        resolve(source).iter().map(|e| e.to_string()).collect()
    }

    #[test]
    fn clean_program_produces_no_errors() {
        let errors = resolve(
            "var a = 1;\
             { var b = a; fun f(x) { return x + b; } f(2); }",
        );

        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    }

    #[test]
    fn reading_a_local_in_its_own_initializer() {
        let errors = messages("var a = 1; { var a = a; }");

        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0],
            "[line 1] Error at 'a': Cannot read local variable in its own initializer"
        );
    }

    #[test]
    fn global_self_reference_in_an_initializer_is_not_a_resolver_error() {
        // Globals are exempt from the own-initializer rule; whether `a`
        // exists is decided at runtime.
        let errors = resolve("var a = a;");

        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    }

    #[test]
    fn global_redeclaration_is_allowed() {
        let errors = resolve("var a = 1; var a = 2;");

        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    }

    #[test]
    fn local_redeclaration_is_rejected() {
        let errors = messages("{ var a = 1; var a = 2; }");

        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0],
            "[line 1] Error at 'a': Already a variable with this name in this scope"
        );
    }

    #[test]
    fn shadowing_in_a_nested_scope_is_allowed() {
        let errors = resolve("{ var a = 1; { var a = 2; } }");

        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    }

    #[test]
    fn top_level_return_is_rejected() {
        let errors = messages("return 1;");

        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0],
            "[line 1] Error at 'return': Cannot return from top-level code"
        );
    }

    #[test]
    fn returning_a_value_from_an_initializer_is_rejected() {
        let errors = messages("class A { init() { return 1; } }");

        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0],
            "[line 1] Error at 'return': Cannot return a value from an initializer"
        );
    }

    #[test]
    fn bare_return_from_an_initializer_is_allowed() {
        let errors = resolve("class A { init() { return; } }");

        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    }

    #[test]
    fn this_outside_a_class_is_rejected() {
        let errors = messages("print this;");

        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0],
            "[line 1] Error at 'this': Cannot use 'this' outside of a class"
        );
    }

    #[test]
    fn this_in_a_nested_function_inside_a_method_resolves() {
        let errors = resolve("class A { m() { fun inner() { return this; } return inner; } }");

        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    }

    #[test]
    fn super_outside_a_class_is_rejected() {
        let errors = messages("print super.x;");

        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0],
            "[line 1] Error at 'super': Cannot use 'super' outside of a class"
        );
    }

    #[test]
    fn super_without_a_superclass_is_rejected() {
        let errors = messages("class A { m() { return super.m(); } }");

        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0],
            "[line 1] Error at 'super': Cannot use 'super' in a class with no superclass"
        );
    }

    #[test]
    fn self_inheritance_is_rejected() {
        let errors = messages("class A < A {}");

        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0],
            "[line 1] Error at 'A': A class cannot inherit from itself"
        );
    }

    #[test]
    fn errors_accumulate_instead_of_stopping_at_the_first() {
        let errors = resolve("return 1;\nprint this;\n{ var a = 1; var a = 2; }");

        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn forward_references_between_globals_resolve() {
        // isOdd is used before it is declared; globals stay dynamic.
        let errors = resolve(
            "fun isEven(n) { if (n == 0) return true; return isOdd(n - 1); }\
             fun isOdd(n) { if (n == 0) return false; return isEven(n - 1); }",
        );

        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    }
}

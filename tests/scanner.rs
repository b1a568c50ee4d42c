mod scanner_tests {
    use tlox::scanner::Scanner;
    use tlox::token::{Token, TokenType};

    fn assert_token_sequence(source: &str, expected: &[(TokenType, &str)]) {
        let scanner = Scanner::new(source);
        let tokens: Vec<Token> = scanner.filter_map(Result::ok).collect();

        assert_eq!(tokens.len(), expected.len());

        for (actual, (expected_type, expected_lexeme)) in tokens.iter().zip(expected.iter()) {
            assert_eq!(actual.token_type, *expected_type);
            assert_eq!(actual.lexeme, *expected_lexeme);
        }
    }

    #[test]
    fn symbols() {
        assert_token_sequence(
            "({*.,+*})",
            &[
                (TokenType::LEFT_PAREN, "("),
                (TokenType::LEFT_BRACE, "{"),
                (TokenType::STAR, "*"),
                (TokenType::DOT, "."),
                (TokenType::COMMA, ","),
                (TokenType::PLUS, "+"),
                (TokenType::STAR, "*"),
                (TokenType::RIGHT_BRACE, "}"),
                (TokenType::RIGHT_PAREN, ")"),
                (TokenType::EOF, ""),
            ],
        );
    }

    #[test]
    fn one_and_two_char_operators() {
        assert_token_sequence(
            "! != = == < <= > >=",
            &[
                (TokenType::BANG, "!"),
                (TokenType::BANG_EQUAL, "!="),
                (TokenType::EQUAL, "="),
                (TokenType::EQUAL_EQUAL, "=="),
                (TokenType::LESS, "<"),
                (TokenType::LESS_EQUAL, "<="),
                (TokenType::GREATER, ">"),
                (TokenType::GREATER_EQUAL, ">="),
                (TokenType::EOF, ""),
            ],
        );
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_token_sequence(
            "var language = lox;",
            &[
                (TokenType::VAR, "var"),
                (TokenType::IDENTIFIER, "language"),
                (TokenType::EQUAL, "="),
                (TokenType::IDENTIFIER, "lox"),
                (TokenType::SEMICOLON, ";"),
                (TokenType::EOF, ""),
            ],
        );
    }

    #[test]
    fn all_keywords() {
        let source = "and class else false fun for if nil or print return super this true var while";

        let scanner = Scanner::new(source);
        let tokens: Vec<Token> = scanner.filter_map(Result::ok).collect();

        let expected = [
            TokenType::AND,
            TokenType::CLASS,
            TokenType::ELSE,
            TokenType::FALSE,
            TokenType::FUN,
            TokenType::FOR,
            TokenType::IF,
            TokenType::NIL,
            TokenType::OR,
            TokenType::PRINT,
            TokenType::RETURN,
            TokenType::SUPER,
            TokenType::THIS,
            TokenType::TRUE,
            TokenType::VAR,
            TokenType::WHILE,
            TokenType::EOF,
        ];

        assert_eq!(tokens.len(), expected.len());

        for (actual, expected_type) in tokens.iter().zip(expected.iter()) {
            assert_eq!(actual.token_type, *expected_type);
        }
    }

    #[test]
    fn number_literals() {
        let scanner = Scanner::new("123 3.14");
        let tokens: Vec<Token> = scanner.filter_map(Result::ok).collect();

        assert_eq!(tokens.len(), 3);

        match tokens[0].token_type {
            TokenType::NUMBER(n) => assert_eq!(n, 123.0),
            ref other => panic!("expected NUMBER, got {:?}", other),
        }

        match tokens[1].token_type {
            TokenType::NUMBER(n) => assert_eq!(n, 3.14),
            ref other => panic!("expected NUMBER, got {:?}", other),
        }
    }

    #[test]
    fn number_display_keeps_trailing_decimal() {
        let scanner = Scanner::new("42");
        let token = scanner
            .filter_map(Result::ok)
            .next()
            .unwrap();

        assert_eq!(token.to_string(), "NUMBER 42 42.0");
    }

    #[test]
    fn dot_after_integer_is_its_own_token() {
        assert_token_sequence(
            "123.",
            &[
                (TokenType::NUMBER(123.0), "123"),
                (TokenType::DOT, "."),
                (TokenType::EOF, ""),
            ],
        );
    }

    #[test]
    fn string_literal_strips_quotes() {
        let scanner = Scanner::new("\"hello world\"");
        let tokens: Vec<Token> = scanner.filter_map(Result::ok).collect();

        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].lexeme, "\"hello world\"");

        match &tokens[0].token_type {
            TokenType::STRING(s) => assert_eq!(s, "hello world"),
            other => panic!("expected STRING, got {:?}", other),
        }
    }

    #[test]
    fn multiline_string_counts_lines() {
        let scanner = Scanner::new("\"first\nsecond\" x");
        let tokens: Vec<Token> = scanner.filter_map(Result::ok).collect();

        assert_eq!(tokens[0].line, 2);
        assert_eq!(tokens[1].lexeme, "x");
        assert_eq!(tokens[1].line, 2);
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let scanner = Scanner::new("\"never closed");
        let results: Vec<_> = scanner.collect();

        let errors: Vec<String> = results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .map(|e| e.to_string())
            .collect();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0], "[line 1] Error: Unterminated string");
    }

    #[test]
    fn comments_are_skipped() {
        assert_token_sequence(
            "// a comment\nvar x; // trailing\n// last line",
            &[
                (TokenType::VAR, "var"),
                (TokenType::IDENTIFIER, "x"),
                (TokenType::SEMICOLON, ";"),
                (TokenType::EOF, ""),
            ],
        );
    }

    #[test]
    fn unexpected_characters_are_reported_and_scanning_continues() {
        let scanner = Scanner::new(",.$(#");
        let results: Vec<_> = scanner.collect();

        // COMMA, DOT, error for '$', LEFT_PAREN, error for '#', EOF.
        assert_eq!(results.len(), 6);

        let error_count = results.iter().filter(|r| r.is_err()).count();
        assert_eq!(error_count, 2);

        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(
                err.to_string().contains("Unexpected character"),
                "unexpected message: {}",
                err
            );
        }

        let tokens: Vec<&Token> = results.iter().filter_map(|r| r.as_ref().ok()).collect();

        assert_eq!(tokens[0].token_type, TokenType::COMMA);
        assert_eq!(tokens[1].token_type, TokenType::DOT);
        assert_eq!(tokens[2].token_type, TokenType::LEFT_PAREN);
        assert_eq!(tokens[3].token_type, TokenType::EOF);
    }

    #[test]
    fn error_lines_are_one_based() {
        let scanner = Scanner::new("x\n\n@");
        let error = scanner
            .filter_map(Result::err)
            .next()
            .unwrap();

        assert_eq!(error.to_string(), "[line 3] Error: Unexpected character: @");
    }

    #[test]
    fn empty_source_yields_only_eof() {
        assert_token_sequence("", &[(TokenType::EOF, "")]);
    }
}

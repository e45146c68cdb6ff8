//! Compilation engine: single-pass recursive descent over the Jack grammar.
//!
//! The engine parses one `class` production and emits the corresponding VM
//! module as it goes. There is no intermediate tree: each grammar rule both
//! consumes tokens and writes instructions, consulting the symbol table to
//! resolve identifiers and to disambiguate method calls from class calls.
//! The first token mismatch aborts compilation.

use crate::error::{CompileError, Result};
use crate::symbol_table::{Symbol, SymbolKind, SymbolTable};
use crate::token::{Keyword, Span, SpannedToken, Token};
use crate::vm_writer::VmWriter;

/// Maximum expression nesting depth before the engine bails out.
/// Prevents stack overflow on pathological input (e.g., `(((((...)))))`).
/// 25 is generous for real Jack programs (typical nesting: 3-5 levels).
const MAX_DEPTH: usize = 25;

/// Map a binary operator to its VM arithmetic command. `*` and `/` are not
/// here: the VM has no multiply/divide, so they lower to OS calls.
fn binary_op_command(op: char) -> Option<&'static str> {
    match op {
        '+' => Some("add"),
        '-' => Some("sub"),
        '&' => Some("and"),
        '|' => Some("or"),
        '<' => Some("lt"),
        '>' => Some("gt"),
        '=' => Some("eq"),
        _ => None,
    }
}

/// Single-pass parser and code generator for one Jack class.
pub struct CompilationEngine<'a> {
    tokens: &'a [SpannedToken],
    pos: usize,
    symbols: SymbolTable,
    vm: VmWriter,
    class_name: String,
    /// One counter per class, shared by all label prefixes, never reset.
    label_counter: u32,
    depth: usize,
}

impl<'a> CompilationEngine<'a> {
    /// Create a new engine over the given token stream.
    pub fn new(tokens: &'a [SpannedToken]) -> Self {
        Self {
            tokens,
            pos: 0,
            symbols: SymbolTable::new(),
            vm: VmWriter::new(),
            class_name: String::new(),
            label_counter: 0,
            depth: 0,
        }
    }

    /// Compile one class and return the emitted VM module.
    ///
    /// Tokens past the closing `}` of the class are ignored: a compilation
    /// unit is exactly one class.
    pub fn compile(mut self) -> Result<String> {
        self.compile_class()?;
        Ok(self.vm.into_output())
    }

    // ========================================================================
    // Token cursor
    // ========================================================================

    fn current(&self) -> Option<&SpannedToken> {
        self.tokens.get(self.pos)
    }

    fn current_span(&self) -> Span {
        self.current()
            .map(|t| t.span.clone())
            .unwrap_or_else(|| Span::new(0, 0, 1, 1))
    }

    fn peek_token(&self) -> Option<&Token> {
        self.current().map(|t| &t.token)
    }

    fn peek_keyword(&self) -> Option<Keyword> {
        match self.peek_token() {
            Some(Token::Keyword(k)) => Some(*k),
            _ => None,
        }
    }

    fn peek_symbol(&self) -> Option<char> {
        match self.peek_token() {
            Some(Token::Symbol(c)) => Some(*c),
            _ => None,
        }
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    /// Build a syntax error from the expected description and the current token.
    fn syntax_error(&self, expected: impl Into<String>) -> CompileError {
        let got = self
            .peek_token()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "end of file".to_string());
        CompileError::syntax(self.current_span(), expected, got)
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<()> {
        if self.peek_keyword() == Some(keyword) {
            self.advance();
            Ok(())
        } else {
            Err(self.syntax_error(format!("keyword '{}'", keyword.as_str())))
        }
    }

    fn expect_symbol(&mut self, symbol: char) -> Result<()> {
        if self.peek_symbol() == Some(symbol) {
            self.advance();
            Ok(())
        } else {
            Err(self.syntax_error(format!("'{}'", symbol)))
        }
    }

    fn expect_identifier(&mut self) -> Result<(String, Span)> {
        if let Some(Token::Identifier(name)) = self.peek_token() {
            let name = name.clone();
            let span = self.current_span();
            self.advance();
            Ok((name, span))
        } else {
            Err(self.syntax_error("an identifier"))
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Generate a fresh label. The counter is injective within the class,
    /// therefore within every emitted function.
    fn unique_label(&mut self, prefix: &str) -> String {
        let label = format!("{}{}", prefix, self.label_counter);
        self.label_counter += 1;
        label
    }

    /// Resolve a name that must be a variable in scope.
    fn lookup_variable(&self, name: &str, span: &Span) -> Result<Symbol> {
        self.symbols
            .lookup(name)
            .cloned()
            .ok_or_else(|| CompileError::undefined_variable(name, span.clone()))
    }

    // ========================================================================
    // Class structure
    // ========================================================================

    /// class: 'class' className '{' classVarDec* subroutineDec* '}'
    fn compile_class(&mut self) -> Result<()> {
        self.expect_keyword(Keyword::Class)?;
        let (name, _) = self.expect_identifier()?;
        self.class_name = name;
        self.expect_symbol('{')?;

        while matches!(self.peek_keyword(), Some(Keyword::Static | Keyword::Field)) {
            self.compile_class_var_dec()?;
        }

        while matches!(
            self.peek_keyword(),
            Some(Keyword::Constructor | Keyword::Function | Keyword::Method)
        ) {
            self.compile_subroutine()?;
        }

        self.expect_symbol('}')
    }

    /// classVarDec: ('static' | 'field') type varName (',' varName)* ';'
    fn compile_class_var_dec(&mut self) -> Result<()> {
        let kind = match self.peek_keyword() {
            Some(Keyword::Static) => SymbolKind::Static,
            Some(Keyword::Field) => SymbolKind::Field,
            _ => return Err(self.syntax_error("'static' or 'field'")),
        };
        self.advance();

        let ty = self.parse_type()?;
        let (name, _) = self.expect_identifier()?;
        self.symbols.define(&name, &ty, kind);

        while self.peek_symbol() == Some(',') {
            self.advance();
            let (name, _) = self.expect_identifier()?;
            self.symbols.define(&name, &ty, kind);
        }

        self.expect_symbol(';')
    }

    /// type: 'int' | 'char' | 'boolean' | className
    ///
    /// The type is only a grammatical slot; the raw lexeme is what the
    /// symbol table stores and what method dispatch later reads back.
    fn parse_type(&mut self) -> Result<String> {
        let ty = match self.peek_token() {
            Some(Token::Keyword(k @ (Keyword::Int | Keyword::Char | Keyword::Boolean))) => {
                k.as_str().to_string()
            }
            Some(Token::Identifier(name)) => name.clone(),
            _ => return Err(self.syntax_error("a type (int, char, boolean, or class name)")),
        };
        self.advance();
        Ok(ty)
    }

    /// subroutineDec: ('constructor'|'function'|'method') ('void'|type)
    ///                subroutineName '(' parameterList ')' subroutineBody
    fn compile_subroutine(&mut self) -> Result<()> {
        let kind = match self.peek_keyword() {
            Some(k @ (Keyword::Constructor | Keyword::Function | Keyword::Method)) => k,
            _ => return Err(self.syntax_error("'constructor', 'function', or 'method'")),
        };
        self.advance();

        // Return type slot: checked grammatically, not used for codegen.
        if self.peek_keyword() == Some(Keyword::Void) {
            self.advance();
        } else {
            self.parse_type()?;
        }

        let (name, _) = self.expect_identifier()?;

        self.symbols.start_subroutine();
        if kind == Keyword::Method {
            // The receiver occupies argument 0.
            let class_name = self.class_name.clone();
            self.symbols.define("this", &class_name, SymbolKind::Arg);
        }

        self.expect_symbol('(')?;
        self.compile_parameter_list()?;
        self.expect_symbol(')')?;

        self.expect_symbol('{')?;
        while self.peek_keyword() == Some(Keyword::Var) {
            self.compile_var_dec()?;
        }

        // All locals must be declared before the directive can be emitted:
        // nLocals is the final Var count.
        let num_locals = self.symbols.var_count(SymbolKind::Var);
        let full_name = format!("{}.{}", self.class_name, name);
        self.vm.write_function(&full_name, num_locals);

        match kind {
            Keyword::Constructor => {
                let fields = self.symbols.field_count();
                self.vm.write_push("constant", fields)?;
                self.vm.write_call("Memory.alloc", 1);
                self.vm.write_pop("pointer", 0)?;
            }
            Keyword::Method => {
                self.vm.write_push("argument", 0)?;
                self.vm.write_pop("pointer", 0)?;
            }
            _ => {}
        }

        self.compile_statements()?;
        self.expect_symbol('}')
    }

    /// parameterList: ((type varName) (',' type varName)*)?
    fn compile_parameter_list(&mut self) -> Result<()> {
        if self.peek_symbol() == Some(')') {
            return Ok(());
        }

        let ty = self.parse_type()?;
        let (name, _) = self.expect_identifier()?;
        self.symbols.define(&name, &ty, SymbolKind::Arg);

        while self.peek_symbol() == Some(',') {
            self.advance();
            let ty = self.parse_type()?;
            let (name, _) = self.expect_identifier()?;
            self.symbols.define(&name, &ty, SymbolKind::Arg);
        }

        Ok(())
    }

    /// varDec: 'var' type varName (',' varName)* ';'
    fn compile_var_dec(&mut self) -> Result<()> {
        self.expect_keyword(Keyword::Var)?;
        let ty = self.parse_type()?;
        let (name, _) = self.expect_identifier()?;
        self.symbols.define(&name, &ty, SymbolKind::Var);

        while self.peek_symbol() == Some(',') {
            self.advance();
            let (name, _) = self.expect_identifier()?;
            self.symbols.define(&name, &ty, SymbolKind::Var);
        }

        self.expect_symbol(';')
    }

    // ========================================================================
    // Statements
    // ========================================================================

    /// statements: (letStatement | ifStatement | whileStatement
    ///              | doStatement | returnStatement)*
    fn compile_statements(&mut self) -> Result<()> {
        loop {
            match self.peek_keyword() {
                Some(Keyword::Let) => self.compile_let()?,
                Some(Keyword::If) => self.compile_if()?,
                Some(Keyword::While) => self.compile_while()?,
                Some(Keyword::Do) => self.compile_do()?,
                Some(Keyword::Return) => self.compile_return()?,
                _ => return Ok(()),
            }
        }
    }

    /// letStatement: 'let' varName ('[' expression ']')? '=' expression ';'
    fn compile_let(&mut self) -> Result<()> {
        self.expect_keyword(Keyword::Let)?;
        let (name, span) = self.expect_identifier()?;
        let symbol = self.lookup_variable(&name, &span)?;

        if self.peek_symbol() == Some('[') {
            self.advance();
            self.compile_expression()?; // index
            self.expect_symbol(']')?;
            self.vm.write_push(symbol.segment(), symbol.index)?; // base
            self.vm.write_arithmetic("add")?;

            self.expect_symbol('=')?;
            self.compile_expression()?; // value
            self.expect_symbol(';')?;

            // Stash the value in temp 0 while rebinding THAT: the right-hand
            // side may itself have used pointer 1 for array indexing.
            self.vm.write_pop("temp", 0)?;
            self.vm.write_pop("pointer", 1)?;
            self.vm.write_push("temp", 0)?;
            self.vm.write_pop("that", 0)?;
        } else {
            self.expect_symbol('=')?;
            self.compile_expression()?;
            self.expect_symbol(';')?;
            self.vm.write_pop(symbol.segment(), symbol.index)?;
        }

        Ok(())
    }

    /// ifStatement: 'if' '(' expression ')' '{' statements '}'
    ///              ('else' '{' statements '}')?
    fn compile_if(&mut self) -> Result<()> {
        self.expect_keyword(Keyword::If)?;
        let true_label = self.unique_label("IF_TRUE");
        let false_label = self.unique_label("IF_FALSE");

        self.expect_symbol('(')?;
        self.compile_expression()?;
        self.expect_symbol(')')?;

        self.vm.write_if_goto(&true_label);
        self.vm.write_goto(&false_label);
        self.vm.write_label(&true_label);

        self.expect_symbol('{')?;
        self.compile_statements()?;
        self.expect_symbol('}')?;

        if self.peek_keyword() == Some(Keyword::Else) {
            self.advance();
            let end_label = self.unique_label("IF_END");
            self.vm.write_goto(&end_label);
            self.vm.write_label(&false_label);

            self.expect_symbol('{')?;
            self.compile_statements()?;
            self.expect_symbol('}')?;

            self.vm.write_label(&end_label);
        } else {
            self.vm.write_label(&false_label);
        }

        Ok(())
    }

    /// whileStatement: 'while' '(' expression ')' '{' statements '}'
    fn compile_while(&mut self) -> Result<()> {
        self.expect_keyword(Keyword::While)?;
        let exp_label = self.unique_label("WHILE_EXP");
        let end_label = self.unique_label("WHILE_END");

        self.vm.write_label(&exp_label);

        self.expect_symbol('(')?;
        self.compile_expression()?;
        self.expect_symbol(')')?;

        self.vm.write_arithmetic("not")?;
        self.vm.write_if_goto(&end_label);

        self.expect_symbol('{')?;
        self.compile_statements()?;
        self.expect_symbol('}')?;

        self.vm.write_goto(&exp_label);
        self.vm.write_label(&end_label);

        Ok(())
    }

    /// doStatement: 'do' subroutineCall ';'
    fn compile_do(&mut self) -> Result<()> {
        self.expect_keyword(Keyword::Do)?;
        let (name, _) = self.expect_identifier()?;
        self.compile_call(name)?;
        self.expect_symbol(';')?;
        // Discard the returned value.
        self.vm.write_pop("temp", 0)
    }

    /// returnStatement: 'return' expression? ';'
    fn compile_return(&mut self) -> Result<()> {
        self.expect_keyword(Keyword::Return)?;

        if self.peek_symbol() == Some(';') {
            // Void returns still leave a value for the caller to discard.
            self.vm.write_push("constant", 0)?;
        } else {
            self.compile_expression()?;
        }

        self.expect_symbol(';')?;
        self.vm.write_return();
        Ok(())
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    /// expression: term (op term)*
    ///
    /// Jack has no operator precedence: the sequence is compiled left to
    /// right, each operator applied as soon as its right term is on the stack.
    fn compile_expression(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            self.depth -= 1;
            return Err(CompileError::NestingTooDeep {
                span: self.current_span(),
            });
        }
        let result = self.compile_expression_inner();
        self.depth -= 1;
        result
    }

    fn compile_expression_inner(&mut self) -> Result<()> {
        self.compile_term()?;

        loop {
            let Some(op) = self.peek_symbol() else {
                return Ok(());
            };
            if op == '*' || op == '/' {
                self.advance();
                self.compile_term()?;
                let callee = if op == '*' { "Math.multiply" } else { "Math.divide" };
                self.vm.write_call(callee, 2);
            } else if let Some(cmd) = binary_op_command(op) {
                self.advance();
                self.compile_term()?;
                self.vm.write_arithmetic(cmd)?;
            } else {
                return Ok(());
            }
        }
    }

    /// term: integerConstant | stringConstant | keywordConstant | varName
    ///       | varName '[' expression ']' | subroutineCall
    ///       | '(' expression ')' | unaryOp term
    fn compile_term(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            self.depth -= 1;
            return Err(CompileError::NestingTooDeep {
                span: self.current_span(),
            });
        }
        let result = self.compile_term_inner();
        self.depth -= 1;
        result
    }

    fn compile_term_inner(&mut self) -> Result<()> {
        let span = self.current_span();

        match self.peek_token().cloned() {
            Some(Token::IntegerConstant(n)) => {
                self.advance();
                self.vm.write_push("constant", n)?;
            }

            Some(Token::StringConstant(s)) => {
                self.advance();
                self.compile_string_constant(&s)?;
            }

            Some(Token::Keyword(Keyword::True)) => {
                // true is -1, all bits set.
                self.advance();
                self.vm.write_push("constant", 0)?;
                self.vm.write_arithmetic("not")?;
            }

            Some(Token::Keyword(Keyword::False | Keyword::Null)) => {
                self.advance();
                self.vm.write_push("constant", 0)?;
            }

            Some(Token::Keyword(Keyword::This)) => {
                self.advance();
                self.vm.write_push("pointer", 0)?;
            }

            Some(Token::Symbol('(')) => {
                self.advance();
                self.compile_expression()?;
                self.expect_symbol(')')?;
            }

            Some(Token::Symbol('-')) => {
                self.advance();
                self.compile_term()?;
                self.vm.write_arithmetic("neg")?;
            }

            Some(Token::Symbol('~')) => {
                self.advance();
                self.compile_term()?;
                self.vm.write_arithmetic("not")?;
            }

            Some(Token::Identifier(name)) => {
                // One token of lookahead decides what the identifier is.
                self.advance();
                match self.peek_symbol() {
                    Some('[') => {
                        self.advance();
                        self.compile_expression()?; // index
                        self.expect_symbol(']')?;
                        let symbol = self.lookup_variable(&name, &span)?;
                        self.vm.write_push(symbol.segment(), symbol.index)?; // base
                        self.vm.write_arithmetic("add")?;
                        self.vm.write_pop("pointer", 1)?;
                        self.vm.write_push("that", 0)?;
                    }
                    Some('(') | Some('.') => {
                        self.compile_call(name)?;
                    }
                    _ => {
                        let symbol = self.lookup_variable(&name, &span)?;
                        self.vm.write_push(symbol.segment(), symbol.index)?;
                    }
                }
            }

            _ => return Err(self.syntax_error("a term")),
        }

        Ok(())
    }

    /// Push a new String object built character by character.
    fn compile_string_constant(&mut self, s: &str) -> Result<()> {
        self.vm.write_push("constant", s.len() as u16)?;
        self.vm.write_call("String.new", 1);
        for ch in s.chars() {
            self.vm.write_push("constant", ch as u16)?;
            self.vm.write_call("String.appendChar", 2);
        }
        Ok(())
    }

    /// subroutineCall, with the leading identifier already consumed:
    ///   name '(' expressionList ')'
    /// | (className | varName) '.' subroutineName '(' expressionList ')'
    ///
    /// The receiver is resolved through the symbol table BEFORE anything is
    /// pushed: a defined variable means a method call on that object, an
    /// unknown qualifier is taken on faith as a class name.
    fn compile_call(&mut self, first: String) -> Result<()> {
        if self.peek_symbol() == Some('.') {
            self.advance();
            let (sub_name, _) = self.expect_identifier()?;
            self.expect_symbol('(')?;

            match self.symbols.lookup(&first).cloned() {
                Some(symbol) => {
                    self.vm.write_push(symbol.segment(), symbol.index)?;
                    let n_args = self.compile_expression_list()?;
                    self.expect_symbol(')')?;
                    self.vm
                        .write_call(&format!("{}.{}", symbol.ty, sub_name), n_args + 1);
                }
                None => {
                    let n_args = self.compile_expression_list()?;
                    self.expect_symbol(')')?;
                    self.vm
                        .write_call(&format!("{}.{}", first, sub_name), n_args);
                }
            }
        } else {
            // Bare call: an implicit method call on `this`.
            self.expect_symbol('(')?;
            self.vm.write_push("pointer", 0)?;
            let n_args = self.compile_expression_list()?;
            self.expect_symbol(')')?;
            self.vm
                .write_call(&format!("{}.{}", self.class_name, first), n_args + 1);
        }

        Ok(())
    }

    /// expressionList: (expression (',' expression)*)?
    ///
    /// Returns the number of expressions compiled.
    fn compile_expression_list(&mut self) -> Result<u16> {
        if self.peek_symbol() == Some(')') {
            return Ok(0);
        }

        self.compile_expression()?;
        let mut count = 1;

        while self.peek_symbol() == Some(',') {
            self.advance();
            self.compile_expression()?;
            count += 1;
        }

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::Tokenizer;

    /// Helper to compile Jack source and return the VM code.
    fn compile_source(source: &str) -> Result<String> {
        let tokens = Tokenizer::new(source).tokenize().expect("tokenization failed");
        CompilationEngine::new(&tokens).compile()
    }

    #[test]
    fn test_empty_function() {
        let vm = compile_source("class Main { function void main() { return; } }").unwrap();
        assert_eq!(vm, "\nfunction Main.main 0\npush constant 0\nreturn\n");
    }

    #[test]
    fn test_locals_count_in_directive() {
        let source = r#"
class Main {
    function int test() {
        var int x, y;
        var boolean z;
        return 0;
    }
}
"#;
        let vm = compile_source(source).unwrap();
        assert!(vm.contains("function Main.test 3"));
    }

    #[test]
    fn test_simple_arithmetic() {
        let source = "class M { function int f() { return 1 + 2; } }";
        let vm = compile_source(source).unwrap();
        assert!(vm.contains("push constant 1\npush constant 2\nadd\nreturn"));
    }

    #[test]
    fn test_uniform_precedence_left_to_right() {
        // 1 + 2 * 3 is (1 + 2) * 3 in Jack.
        let source = "class M { function int f() { return 1 + 2 * 3; } }";
        let vm = compile_source(source).unwrap();
        assert!(vm.contains(
            "push constant 1\npush constant 2\nadd\npush constant 3\ncall Math.multiply 2"
        ));
    }

    #[test]
    fn test_division_calls_os() {
        let source = "class M { function int f(int a, int b) { return a / b; } }";
        let vm = compile_source(source).unwrap();
        assert!(vm.contains("push argument 0\npush argument 1\ncall Math.divide 2"));
    }

    #[test]
    fn test_comparison_operators() {
        let source = "class M { function boolean f(int a) { return (a < 1) = (a > 2); } }";
        let vm = compile_source(source).unwrap();
        assert!(vm.contains("lt"));
        assert!(vm.contains("gt"));
        assert!(vm.contains("eq"));
    }

    #[test]
    fn test_unary_operators() {
        let vm = compile_source("class M { function int f() { return -5; } }").unwrap();
        assert!(vm.contains("push constant 5\nneg"));

        let vm = compile_source("class M { function boolean f() { return ~false; } }").unwrap();
        assert!(vm.contains("push constant 0\nnot"));
    }

    #[test]
    fn test_keyword_constants() {
        let source = r#"
class M {
    function void f() {
        var boolean a;
        var int b;
        let a = true;
        let a = false;
        let b = null;
        return;
    }
}
"#;
        let vm = compile_source(source).unwrap();
        // true
        assert!(vm.contains("push constant 0\nnot\npop local 0"));
        // false and null
        assert!(vm.contains("push constant 0\npop local 0"));
        assert!(vm.contains("push constant 0\npop local 1"));
    }

    #[test]
    fn test_this_constant() {
        let source = "class C { field int x; constructor C new() { return this; } }";
        let vm = compile_source(source).unwrap();
        assert!(vm.contains("push pointer 0\nreturn"));
    }

    #[test]
    fn test_constructor_prologue() {
        let source = r#"
class Point {
    field int x, y;

    constructor Point new(int ax, int ay) {
        let x = ax;
        let y = ay;
        return this;
    }
}
"#;
        let vm = compile_source(source).unwrap();
        assert!(vm.contains(
            "function Point.new 0\npush constant 2\ncall Memory.alloc 1\npop pointer 0"
        ));
        // Field writes go through the this segment.
        assert!(vm.contains("push argument 0\npop this 0"));
        assert!(vm.contains("push argument 1\npop this 1"));
    }

    #[test]
    fn test_method_prologue() {
        let source = r#"
class Point {
    field int x;

    method int getX() {
        return x;
    }
}
"#;
        let vm = compile_source(source).unwrap();
        assert!(vm.contains("function Point.getX 0\npush argument 0\npop pointer 0"));
        assert!(vm.contains("push this 0\nreturn"));
    }

    #[test]
    fn test_function_has_no_prologue() {
        let vm = compile_source("class M { function void f() { return; } }").unwrap();
        assert_eq!(vm, "\nfunction M.f 0\npush constant 0\nreturn\n");
    }

    #[test]
    fn test_method_args_shifted_by_receiver() {
        let source = r#"
class Point {
    method int plus(int dx) {
        return dx;
    }
}
"#;
        let vm = compile_source(source).unwrap();
        // dx is argument 1; argument 0 is the receiver.
        assert!(vm.contains("push argument 1\nreturn"));
    }

    #[test]
    fn test_bare_call_is_method_on_this() {
        let source = r#"
class Test {
    method void foo() {
        do bar();
        return;
    }

    method void bar() {
        return;
    }
}
"#;
        let vm = compile_source(source).unwrap();
        assert!(vm.contains("push pointer 0\ncall Test.bar 1\npop temp 0"));
    }

    #[test]
    fn test_qualified_call_on_variable_is_method_call() {
        let source = r#"
class Game {
    field Ball ball;

    method void tick() {
        do ball.move(3);
        return;
    }
}
"#;
        let vm = compile_source(source).unwrap();
        // Receiver pushed first, then the argument; count includes the receiver.
        assert!(vm.contains("push this 0\npush constant 3\ncall Ball.move 2"));
    }

    #[test]
    fn test_qualified_call_on_unknown_name_is_class_call() {
        let source = "class G { function void g() { do Sys.halt(); return; } }";
        let vm = compile_source(source).unwrap();
        assert!(vm.contains("call Sys.halt 0\npop temp 0"));
        // No receiver push before the call.
        assert!(!vm.contains("push pointer 0"));
    }

    #[test]
    fn test_local_shadows_class_name_heuristic() {
        // A variable named like a class: lookup finds it, so q.f is a
        // method call dispatched on the variable's type.
        let source = r#"
class M {
    function void f() {
        var Screen s;
        do s.draw();
        return;
    }
}
"#;
        let vm = compile_source(source).unwrap();
        assert!(vm.contains("push local 0\ncall Screen.draw 1"));
    }

    #[test]
    fn test_do_discards_return_value() {
        let source = "class M { function void f() { do Output.println(); return; } }";
        let vm = compile_source(source).unwrap();
        assert!(vm.contains("call Output.println 0\npop temp 0"));
    }

    #[test]
    fn test_void_return_pushes_zero() {
        let vm = compile_source("class M { function void f() { return; } }").unwrap();
        assert!(vm.contains("push constant 0\nreturn"));
    }

    #[test]
    fn test_if_without_else() {
        let source = r#"
class M {
    function void f(int x) {
        if (x < 3) {
            do Output.println();
        }
        return;
    }
}
"#;
        let vm = compile_source(source).unwrap();
        let expected = "\
push argument 0
push constant 3
lt
if-goto IF_TRUE0
goto IF_FALSE1
label IF_TRUE0
call Output.println 0
pop temp 0
label IF_FALSE1
";
        assert!(vm.contains(expected));
    }

    #[test]
    fn test_if_with_else() {
        let source = r#"
class M {
    function int f(int x) {
        if (x) {
            return 1;
        } else {
            return 2;
        }
    }
}
"#;
        let vm = compile_source(source).unwrap();
        let expected = "\
push argument 0
if-goto IF_TRUE0
goto IF_FALSE1
label IF_TRUE0
push constant 1
return
goto IF_END2
label IF_FALSE1
push constant 2
return
label IF_END2
";
        assert!(vm.contains(expected));
    }

    #[test]
    fn test_while_loop() {
        let source = "class W { function void w() { while (false) { return; } } }";
        let vm = compile_source(source).unwrap();
        let expected = "\
function W.w 0
label WHILE_EXP0
push constant 0
not
if-goto WHILE_END1
push constant 0
return
goto WHILE_EXP0
label WHILE_END1
";
        assert!(vm.contains(expected));
    }

    #[test]
    fn test_label_counter_not_reset_between_subroutines() {
        let source = r#"
class M {
    function void f() {
        while (false) { }
        return;
    }
    function void g() {
        while (false) { }
        return;
    }
}
"#;
        let vm = compile_source(source).unwrap();
        assert!(vm.contains("label WHILE_EXP0"));
        assert!(vm.contains("label WHILE_END1"));
        assert!(vm.contains("label WHILE_EXP2"));
        assert!(vm.contains("label WHILE_END3"));
    }

    #[test]
    fn test_array_read() {
        let source = r#"
class M {
    function int f() {
        var Array a;
        return a[5];
    }
}
"#;
        let vm = compile_source(source).unwrap();
        // Index first, then base, then the THAT dereference.
        assert!(vm.contains("push constant 5\npush local 0\nadd\npop pointer 1\npush that 0"));
    }

    #[test]
    fn test_array_write_stash_tail() {
        let source = r#"
class M {
    function void f() {
        var Array a;
        let a[3] = 42;
        return;
    }
}
"#;
        let vm = compile_source(source).unwrap();
        assert!(vm.contains(
            "push constant 3\npush local 0\nadd\npush constant 42\n\
             pop temp 0\npop pointer 1\npush temp 0\npop that 0"
        ));
    }

    #[test]
    fn test_nested_array_rhs_does_not_clobber_that() {
        let source = r#"
class M {
    function void f() {
        var Array a, b;
        let a[1] = b[2];
        return;
    }
}
"#;
        let vm = compile_source(source).unwrap();
        let expected = "\
push constant 1
push local 0
add
push constant 2
push local 1
add
pop pointer 1
push that 0
pop temp 0
pop pointer 1
push temp 0
pop that 0
";
        assert!(vm.contains(expected));
    }

    #[test]
    fn test_string_constant() {
        let source = r#"class S { function String s() { return "Hi"; } }"#;
        let vm = compile_source(source).unwrap();
        let expected = "\
push constant 2
call String.new 1
push constant 72
call String.appendChar 2
push constant 105
call String.appendChar 2
";
        assert!(vm.contains(expected));
    }

    #[test]
    fn test_empty_string_constant() {
        let source = r#"class S { function String s() { return ""; } }"#;
        let vm = compile_source(source).unwrap();
        assert!(vm.contains("push constant 0\ncall String.new 1\nreturn"));
        assert!(!vm.contains("appendChar"));
    }

    #[test]
    fn test_static_variables() {
        let source = r#"
class Counter {
    static int count;

    function void increment() {
        let count = count + 1;
        return;
    }
}
"#;
        let vm = compile_source(source).unwrap();
        assert!(vm.contains("push static 0\npush constant 1\nadd\npop static 0"));
    }

    #[test]
    fn test_undefined_variable_in_let() {
        let err = compile_source("class M { function void f() { let x = 5; return; } }")
            .unwrap_err();
        assert!(matches!(err, CompileError::UndefinedVariable { name, .. } if name == "x"));
    }

    #[test]
    fn test_undefined_variable_in_term() {
        let err = compile_source("class M { function int f() { return y; } }").unwrap_err();
        assert!(matches!(err, CompileError::UndefinedVariable { name, .. } if name == "y"));
    }

    #[test]
    fn test_syntax_error_missing_semicolon() {
        let err = compile_source("class M { function void f() { var int x; let x = 5 } }")
            .unwrap_err();
        match err {
            CompileError::Syntax { expected, got, .. } => {
                assert_eq!(expected, "';'");
                assert_eq!(got, "symbol '}'");
            }
            other => panic!("expected Syntax, got {:?}", other),
        }
    }

    #[test]
    fn test_bare_return_missing_semicolon_fails_as_term() {
        // `return }` reads the `}` as the start of an expression.
        let err = compile_source("class M { function void f() { return } }").unwrap_err();
        match err {
            CompileError::Syntax { expected, got, .. } => {
                assert_eq!(expected, "a term");
                assert_eq!(got, "symbol '}'");
            }
            other => panic!("expected Syntax, got {:?}", other),
        }
    }

    #[test]
    fn test_syntax_error_at_eof() {
        let err = compile_source("class M {").unwrap_err();
        match err {
            CompileError::Syntax { got, .. } => assert_eq!(got, "end of file"),
            other => panic!("expected Syntax, got {:?}", other),
        }
    }

    #[test]
    fn test_nesting_depth_guard() {
        let deep = "(".repeat(40) + "1" + &")".repeat(40);
        let source = format!("class M {{ function int f() {{ return {}; }} }}", deep);
        let err = compile_source(&source).unwrap_err();
        assert!(matches!(err, CompileError::NestingTooDeep { .. }));
    }

    #[test]
    fn test_trailing_tokens_after_class_ignored() {
        let vm = compile_source("class M { } extra tokens").unwrap();
        assert_eq!(vm, "");
    }

    #[test]
    fn test_parameters_define_in_order() {
        let source = r#"
class M {
    function int f(int a, boolean b, char c) {
        return a;
    }
}
"#;
        let vm = compile_source(source).unwrap();
        assert!(vm.contains("push argument 0\nreturn"));
    }
}

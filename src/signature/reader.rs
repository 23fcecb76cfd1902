use std::rc::Rc;

use anyhow::Result;

use crate::error::GripError;
use crate::signature::generic_type::{GenericDeclaration, GenericType, TypeVariable};
use crate::signature::mirrors::{ClassSignatureMirror, MethodSignatureMirror};
use crate::types::{ObjectType, PrimitiveType, Type};

/// Parse a class `Signature` attribute. Own type variables are layered on
/// top of `enclosing`.
pub fn read_class_signature(
    signature: &str,
    enclosing: &GenericDeclaration,
) -> Result<ClassSignatureMirror> {
    let mut parser = SignatureParser::new(signature, enclosing);
    let type_variables = parser.formal_type_parameters()?;
    let super_type = parser.class_type_signature()?;
    let mut interfaces = Vec::new();
    while !parser.at_end() {
        interfaces.push(parser.class_type_signature()?);
    }
    Ok(ClassSignatureMirror::new(type_variables, super_type, interfaces))
}

/// Parse a method `Signature` attribute against the owner's declaration.
pub fn read_method_signature(
    signature: &str,
    enclosing: &GenericDeclaration,
) -> Result<MethodSignatureMirror> {
    let mut parser = SignatureParser::new(signature, enclosing);
    let type_variables = parser.formal_type_parameters()?;
    parser.expect('(')?;
    let mut parameter_types = Vec::new();
    while !parser.eat(')') {
        parameter_types.push(parser.java_type_signature()?);
    }
    let return_type = if parser.eat('V') {
        GenericType::Raw(Type::Primitive(PrimitiveType::Void))
    } else {
        parser.java_type_signature()?
    };
    let mut exception_types = Vec::new();
    while parser.eat('^') {
        exception_types.push(parser.reference_type_signature()?);
    }
    parser.finish()?;
    Ok(MethodSignatureMirror::new(
        type_variables,
        parameter_types,
        return_type,
        exception_types,
    ))
}

/// Parse a single type signature, as found on fields.
pub fn read_generic_type(signature: &str, scope: &GenericDeclaration) -> Result<GenericType> {
    let mut parser = SignatureParser::new(signature, scope);
    let generic_type = parser.java_type_signature()?;
    parser.finish()?;
    Ok(generic_type)
}

struct SignatureParser<'a> {
    input: &'a str,
    offset: usize,
    scope: Vec<Rc<TypeVariable>>,
    /// Names of the formal parameter list being declared, and where its
    /// variables start in `scope`.
    pending: Vec<String>,
    list_start: Option<usize>,
    lenient: bool,
}

impl<'a> SignatureParser<'a> {
    fn new(input: &'a str, scope: &GenericDeclaration) -> Self {
        Self {
            input,
            offset: 0,
            scope: scope.type_variables().to_vec(),
            pending: Vec::new(),
            list_start: None,
            lenient: false,
        }
    }

    fn error(&self, reason: impl Into<String>) -> anyhow::Error {
        GripError::MalformedSignature {
            signature: self.input.to_string(),
            reason: reason.into(),
        }
        .into()
    }

    fn peek(&self) -> Option<char> {
        self.input[self.offset..].chars().next()
    }

    fn at_end(&self) -> bool {
        self.offset >= self.input.len()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.offset += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{expected}' at offset {}", self.offset)))
        }
    }

    fn finish(&self) -> Result<()> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.error(format!("unexpected trailing input at offset {}", self.offset)))
        }
    }

    /// Identifier up to the next signature delimiter.
    fn identifier(&mut self) -> Result<&'a str> {
        let input = self.input;
        let rest = &input[self.offset..];
        let end = rest
            .find(|c: char| matches!(c, '.' | ';' | '[' | '/' | '<' | '>' | ':'))
            .unwrap_or(rest.len());
        if end == 0 {
            return Err(self.error(format!("expected identifier at offset {}", self.offset)));
        }
        self.offset += end;
        Ok(&rest[..end])
    }

    fn formal_type_parameters(&mut self) -> Result<Vec<Rc<TypeVariable>>> {
        if !self.eat('<') {
            return Ok(Vec::new());
        }
        // First pass only collects names so bounds may refer to any
        // parameter of the list, including the one being declared.
        let start = self.offset;
        let scope_len = self.scope.len();
        let lenient = std::mem::replace(&mut self.lenient, true);
        let names = self
            .type_parameter_list()?
            .iter()
            .map(|variable| variable.name().to_string())
            .collect();
        self.scope.truncate(scope_len);
        self.lenient = lenient;
        self.offset = start;

        self.pending = names;
        self.list_start = Some(scope_len);
        let declared = self.type_parameter_list();
        self.pending.clear();
        self.list_start = None;
        declared
    }

    fn type_parameter_list(&mut self) -> Result<Vec<Rc<TypeVariable>>> {
        let mut declared = Vec::new();
        while !self.eat('>') {
            let name = self.identifier()?;
            self.expect(':')?;
            let class_bound = match self.peek() {
                Some(':') => GenericType::raw_object(),
                _ => self.reference_type_signature()?,
            };
            let mut interface_bounds = Vec::new();
            while self.eat(':') {
                interface_bounds.push(self.reference_type_signature()?);
            }
            let variable = Rc::new(TypeVariable::new(name, class_bound, interface_bounds));
            self.scope.push(variable.clone());
            declared.push(variable);
        }
        if declared.is_empty() {
            return Err(self.error("empty formal type parameter list"));
        }
        Ok(declared)
    }

    fn java_type_signature(&mut self) -> Result<GenericType> {
        match self.peek() {
            Some('L' | 'T' | '[') => self.reference_type_signature(),
            Some(c) => match PrimitiveType::from_descriptor_char(c) {
                Some(primitive) if primitive != PrimitiveType::Void => {
                    self.offset += 1;
                    Ok(GenericType::Raw(Type::Primitive(primitive)))
                }
                _ => Err(self.error(format!("unexpected '{c}' at offset {}", self.offset))),
            },
            None => Err(self.error("unexpected end of signature")),
        }
    }

    fn reference_type_signature(&mut self) -> Result<GenericType> {
        match self.peek() {
            Some('L') => self.class_type_signature(),
            Some('T') => {
                self.offset += 1;
                let name = self.identifier()?;
                self.expect(';')?;
                self.type_variable(name)
            }
            Some('[') => {
                let mut dimensions = 0;
                while self.eat('[') {
                    dimensions += 1;
                }
                let element = self.java_type_signature()?;
                Ok(array_of(element, dimensions))
            }
            Some(c) => Err(self.error(format!("unexpected '{c}' at offset {}", self.offset))),
            None => Err(self.error("unexpected end of signature")),
        }
    }

    fn class_type_signature(&mut self) -> Result<GenericType> {
        self.expect('L')?;
        let input = self.input;
        let start = self.offset;
        let rest = &input[start..];
        let end = rest
            .find(['<', '.', ';'])
            .ok_or_else(|| self.error("unterminated class type signature"))?;
        if end == 0 {
            return Err(self.error(format!("expected class name at offset {start}")));
        }
        self.offset += end;
        let mut internal_name = rest[..end].to_string();
        let mut current = self.class_type(&internal_name)?;
        while self.eat('.') {
            let name = self.identifier()?;
            internal_name = format!("{internal_name}${name}");
            let ty = self.class_type(&internal_name)?;
            current = GenericType::Inner {
                name: name.to_string(),
                ty: Box::new(ty),
                owner: Box::new(current),
            };
        }
        self.expect(';')?;
        Ok(current)
    }

    fn class_type(&mut self, internal_name: &str) -> Result<GenericType> {
        let ty = ObjectType::new(internal_name);
        if !self.eat('<') {
            return Ok(GenericType::Raw(Type::Object(ty)));
        }
        let mut type_arguments = Vec::new();
        while !self.eat('>') {
            let argument = match self.peek() {
                Some('*') => {
                    self.offset += 1;
                    GenericType::wildcard()
                }
                Some('+') => {
                    self.offset += 1;
                    GenericType::UpperBounded(Box::new(self.reference_type_signature()?))
                }
                Some('-') => {
                    self.offset += 1;
                    GenericType::LowerBounded(Box::new(self.reference_type_signature()?))
                }
                _ => self.reference_type_signature()?,
            };
            type_arguments.push(argument);
        }
        if type_arguments.is_empty() {
            return Err(self.error("empty type argument list"));
        }
        Ok(GenericType::parameterized(ty, type_arguments))
    }

    fn type_variable(&self, name: &str) -> Result<GenericType> {
        if let Some(start) = self.list_start {
            let declared = self.scope[start..]
                .iter()
                .any(|variable| variable.name() == name);
            if !declared && self.pending.iter().any(|pending| pending == name) {
                // Bound refers to a parameter still being declared; keep the
                // reference acyclic.
                return Ok(unbounded(name));
            }
        }
        if let Some(variable) = self.scope.iter().rev().find(|variable| variable.name() == name)
        {
            return Ok(GenericType::TypeVariable(variable.clone()));
        }
        if self.lenient {
            return Ok(unbounded(name));
        }
        Err(self.error(format!("type variable {name} is not declared")))
    }
}

fn unbounded(name: &str) -> GenericType {
    GenericType::TypeVariable(Rc::new(TypeVariable::unbounded(name)))
}

/// Raw element types fold into a raw array type; anything else nests.
fn array_of(element: GenericType, dimensions: usize) -> GenericType {
    match element {
        GenericType::Raw(ty) => GenericType::Raw(ty.to_array_type(dimensions)),
        mut element => {
            for _ in 0..dimensions {
                element = GenericType::Array(Box::new(element));
            }
            element
        }
    }
}

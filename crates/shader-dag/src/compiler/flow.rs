use super::ShaderCompiler;
use crate::error::{Result, ShaderError};
use crate::format::PinFormat;
use crate::operand::Operand;

/// Open control-flow block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum FlowFrame {
    If { has_else: bool },
    While,
    Switch { in_case: bool },
}

fn unbalanced(what: &str) -> ShaderError {
    ShaderError::InvalidControlFlow(format!("{what} without a matching block"))
}

impl ShaderCompiler {
    pub fn begin_if(&mut self, condition: &Operand) -> Result<()> {
        if condition.format != PinFormat::Bool || condition.is_array() {
            return Err(ShaderError::incompatible(format!(
                "{condition} is not a boolean condition"
            )));
        }
        self.flow.push(FlowFrame::If { has_else: false });
        self.driver.begin_if(condition.id);
        Ok(())
    }

    pub fn begin_else(&mut self) -> Result<()> {
        match self.flow.last_mut() {
            Some(FlowFrame::If { has_else }) if !*has_else => *has_else = true,
            _ => return Err(unbalanced("else")),
        }
        self.driver.begin_else();
        Ok(())
    }

    pub fn end_if(&mut self) -> Result<()> {
        if !matches!(self.flow.last(), Some(FlowFrame::If { .. })) {
            return Err(unbalanced("end if"));
        }
        self.flow.pop();
        self.driver.end_if();
        Ok(())
    }

    pub fn begin_while(&mut self) {
        self.flow.push(FlowFrame::While);
        self.driver.begin_while();
    }

    /// Leaves the innermost loop, when `condition` holds if one is given.
    pub fn break_loop(&mut self, condition: Option<&Operand>) -> Result<()> {
        if !self.flow.contains(&FlowFrame::While) {
            return Err(unbalanced("break"));
        }
        if let Some(c) = condition {
            if c.format != PinFormat::Bool || c.is_array() {
                return Err(ShaderError::incompatible(format!(
                    "{c} is not a boolean condition"
                )));
            }
        }
        self.driver.break_loop(condition.map(Operand::id));
        Ok(())
    }

    pub fn end_while(&mut self) -> Result<()> {
        if !matches!(self.flow.last(), Some(FlowFrame::While)) {
            return Err(unbalanced("end while"));
        }
        self.flow.pop();
        self.driver.end_while();
        Ok(())
    }

    pub fn begin_switch(&mut self, selector: &Operand) -> Result<()> {
        if !matches!(selector.format, PinFormat::Integer | PinFormat::UInteger)
            || selector.is_array()
        {
            return Err(ShaderError::incompatible(format!(
                "{selector} cannot select a switch case"
            )));
        }
        self.flow.push(FlowFrame::Switch { in_case: false });
        self.driver.begin_switch(selector.id);
        Ok(())
    }

    fn enter_case(&mut self, what: &str) -> Result<()> {
        match self.flow.last_mut() {
            Some(FlowFrame::Switch { in_case }) if !*in_case => {
                *in_case = true;
                Ok(())
            }
            _ => Err(unbalanced(what)),
        }
    }

    /// Opens a case; the label must be known at compile time.
    pub fn begin_case(&mut self, label: &Operand) -> Result<()> {
        let Some(value) = label.value() else {
            return Err(ShaderError::incompatible(format!(
                "case label {label} is not a fixed value"
            )));
        };
        if !matches!(label.format, PinFormat::Integer | PinFormat::UInteger) {
            return Err(ShaderError::incompatible(format!(
                "case label {label} is not an integer"
            )));
        }
        self.enter_case("case")?;
        self.driver.begin_case(value);
        Ok(())
    }

    pub fn begin_default(&mut self) -> Result<()> {
        self.enter_case("default")?;
        self.driver.begin_default();
        Ok(())
    }

    pub fn end_case(&mut self) -> Result<()> {
        match self.flow.last_mut() {
            Some(FlowFrame::Switch { in_case }) if *in_case => *in_case = false,
            _ => return Err(unbalanced("end case")),
        }
        self.driver.end_case();
        Ok(())
    }

    pub fn end_switch(&mut self) -> Result<()> {
        if !matches!(self.flow.last(), Some(FlowFrame::Switch { in_case: false })) {
            return Err(unbalanced("end switch"));
        }
        self.flow.pop();
        self.driver.end_switch();
        Ok(())
    }
}

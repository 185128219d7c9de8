//! Export side-table produced by the front-end.
//!
//! The table lists what a script exposes to its runtime: variables,
//! invokable functions and data-parallel ("foreach") kernels. The driver
//! only checks for its presence; the script hooks use it to decide which
//! symbols survive internalization.

use std::fmt;

/// Runtime entry points that always keep external visibility.
pub const RUNTIME_ENTRY_POINTS: &[&str] = &["root", "init", ".rs.dtor", ".rs.info"];

/// Shape of a foreach kernel, as a bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ForeachSignature(u32);

impl ForeachSignature {
    /// Kernel receives the current input element.
    pub const IN: ForeachSignature = ForeachSignature(0x01);
    /// Kernel returns the output element.
    pub const OUT: ForeachSignature = ForeachSignature(0x02);
    /// Kernel receives the element index.
    pub const X: ForeachSignature = ForeachSignature(0x08);

    const KNOWN: u32 = 0x01 | 0x02 | 0x08;

    pub const fn empty() -> Self {
        ForeachSignature(0)
    }

    /// Returns `None` when `bits` carries flags this toolchain does not know.
    pub fn from_bits(bits: u32) -> Option<Self> {
        if bits & !Self::KNOWN != 0 {
            return None;
        }
        Some(ForeachSignature(bits))
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: ForeachSignature) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: ForeachSignature) -> Self {
        ForeachSignature(self.0 | other.0)
    }

    /// Number of parameters the kernel function takes.
    pub fn kernel_params(self) -> u32 {
        u32::from(self.contains(Self::IN)) + u32::from(self.contains(Self::X))
    }

    /// Number of results the kernel function returns.
    pub fn kernel_results(self) -> u32 {
        u32::from(self.contains(Self::OUT))
    }
}

impl fmt::Display for ForeachSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeachKernel {
    pub name: String,
    pub signature: ForeachSignature,
}

impl ForeachKernel {
    pub fn new(name: impl Into<String>, signature: ForeachSignature) -> Self {
        Self {
            name: name.into(),
            signature,
        }
    }
}

/// Exported symbols of a script, in declaration order.
///
/// Duplicates are kept as declared.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExportTable {
    vars: Vec<String>,
    funcs: Vec<String>,
    foreach: Vec<ForeachKernel>,
}

impl ExportTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_var(mut self, name: impl Into<String>) -> Self {
        self.add_var(name);
        self
    }

    pub fn with_func(mut self, name: impl Into<String>) -> Self {
        self.add_func(name);
        self
    }

    pub fn with_foreach(mut self, kernel: ForeachKernel) -> Self {
        self.add_foreach(kernel);
        self
    }

    pub fn add_var(&mut self, name: impl Into<String>) {
        self.vars.push(name.into());
    }

    pub fn add_func(&mut self, name: impl Into<String>) {
        self.funcs.push(name.into());
    }

    pub fn add_foreach(&mut self, kernel: ForeachKernel) {
        self.foreach.push(kernel);
    }

    pub fn vars(&self) -> &[String] {
        &self.vars
    }

    pub fn funcs(&self) -> &[String] {
        &self.funcs
    }

    pub fn foreach(&self) -> &[ForeachKernel] {
        &self.foreach
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty() && self.funcs.is_empty() && self.foreach.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_counts_kernel_shape() {
        let sig = ForeachSignature::IN
            .union(ForeachSignature::OUT)
            .union(ForeachSignature::X);
        assert_eq!(sig.bits(), 0x0b);
        assert_eq!(sig.kernel_params(), 2);
        assert_eq!(sig.kernel_results(), 1);
        assert_eq!(ForeachSignature::empty().kernel_params(), 0);
    }

    #[test]
    fn rejects_unknown_signature_bits() {
        assert!(ForeachSignature::from_bits(0x10).is_none());
        assert_eq!(ForeachSignature::from_bits(0x03), Some(ForeachSignature::IN.union(ForeachSignature::OUT)));
    }

    #[test]
    fn keeps_duplicates_in_declaration_order() {
        let table = ExportTable::new()
            .with_var("g_x")
            .with_var("g_x")
            .with_func("compute");
        assert_eq!(table.vars(), ["g_x", "g_x"]);
        assert_eq!(table.funcs(), ["compute"]);
        assert!(!table.is_empty());
    }
}

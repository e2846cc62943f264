//! Method body replacement.

use crate::{
    metadata::method::{MethodBody, MethodDef, MethodImplOptions},
    strip::StripContext,
};

/// Replace the body of `method` with `newobj <stub ctor>; throw`.
///
/// Return type, parameters and modifiers are ignored: the stub never returns. The
/// `internalcall` flag is cleared so the runtime executes the stub instead of looking for a
/// native implementation.
pub fn stub_method(ctx: &StripContext<'_>, method: &mut MethodDef) {
    method.impl_flags &= !MethodImplOptions::INTERNAL_CALL.bits();
    method.body = Some(MethodBody::stub(ctx.stub_constructor));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{
            method::{Instruction, OpCode, Operand},
            token::Token,
        },
        test::factories::{public_method, strip_context},
    };

    #[test]
    fn replaces_real_body() {
        let (config, verdicts) = strip_context();
        let ctx = StripContext::new(&config, Token(0x0A000001), verdicts);

        let mut original = MethodBody::from_instructions(
            2,
            &[
                Instruction::simple(OpCode::LDARG_1),
                Instruction::new(OpCode::LDC_I4, Operand::Int32(42)),
                Instruction::simple(OpCode::RET),
            ],
        )
        .unwrap();
        original.init_locals = true;
        original.local_var_sig = Some(Token(0x11000001));

        let mut method = public_method(1, "Compute").with_body(original);
        stub_method(&ctx, &mut method);

        let body = method.body.unwrap();
        assert!(body.is_stub(Token(0x0A000001)));
        assert_eq!(
            body.encode().unwrap(),
            vec![0x1A, 0x73, 0x01, 0x00, 0x00, 0x0A, 0x7A]
        );
    }

    #[test]
    fn clears_internal_call_and_adds_body() {
        let (config, verdicts) = strip_context();
        let ctx = StripContext::new(&config, Token(0x0A000001), verdicts);

        let mut method = public_method(2, "GetHashCodeNative");
        method.impl_flags = 0x1000 | 0x0003;
        stub_method(&ctx, &mut method);

        assert!(!method.is_internal_call());
        assert_eq!(method.impl_flags, 0x0003);
        assert!(method.body.unwrap().is_stub(Token(0x0A000001)));
    }
}

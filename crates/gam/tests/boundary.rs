//! Boundary behaviour of the capability surfaces.

mod common;

use gam::proto::pointer::GlobalPointer;

#[test]
fn public_capability_on_the_private_surface_is_rejected() {
	common::run_group(2, |rank, ctx| match rank {
		0 => {
			let p = ctx.make_public(7i32);
			p.push(1);
			// the capability is discarded at the peer; its reference is
			// never released, so the record survives until teardown
			drop(p);
		}
		1 => {
			let p = ctx.pull_private::<i32>(Some(0));
			assert!(p.is_null());
		}
		_ => unreachable!(),
	});
}

#[test]
fn private_capability_on_the_public_surface_is_rejected() {
	common::run_group(2, |rank, ctx| match rank {
		0 => {
			let mut p = ctx.make_private(7i32);
			p.push(1);
		}
		1 => {
			let p = ctx.pull_public::<i32>(Some(0));
			assert!(p.is_null());
		}
		_ => unreachable!(),
	});
}

#[test]
fn reserved_tokens_cross_without_view_effects() {
	common::run_group(2, |rank, ctx| match rank {
		0 => {
			ctx.push_reserved(GlobalPointer::EOS, 1);
			// the token comes back through a façade on the other surface
			let back = ctx.pull_private::<u8>(Some(1));
			assert_eq!(back.get(), GlobalPointer::EOS);
			assert!(!ctx.is_mapped(back.get()));
		}
		1 => {
			let token = ctx.pull_public::<u8>(Some(0));
			assert_eq!(token.get(), GlobalPointer::EOS);
			assert!(!ctx.is_mapped(token.get()));
			token.push(0);
		}
		_ => unreachable!(),
	});
}

//! Sharing public pointers between executors.

mod common;

use gam::proto::pointer::GlobalPointer;

#[test]
fn fan_out_counts_every_live_copy() {
	common::run_group(3, |rank, ctx| match rank {
		0 => {
			let p = ctx.make_public(42i32);
			let gp = p.get();
			assert_eq!(p.use_count(), 1);
			p.push(1);
			// all downstream copies released; only the original remains
			common::wait_until("references drain", || p.use_count() == 1);
			drop(p);
			assert!(!ctx.is_mapped(gp));
		}
		1 => {
			let p = ctx.pull_public::<i32>(Some(0));
			let dup = p.clone();
			assert_eq!(dup.use_count(), 3);
			assert_eq!(dup.use_count(), 3); // reading the count changes nothing

			dup.push(2);
			p.push(2);
			// the count query is synchronous with the author, so the two
			// transfer increments are applied once it returns
			assert_eq!(p.use_count(), 5);
			ctx.push_reserved(GlobalPointer::GO_ON, 2);

			// rank 2 confirms its releases went out before we release ours
			let token = ctx.pull_public::<i32>(Some(2));
			assert_eq!(token.get(), GlobalPointer::GO_ON);
			drop(dup);
			drop(p);
		}
		2 => {
			let a = ctx.pull_public::<i32>(Some(1));
			let b = ctx.pull_public::<i32>(Some(1));
			assert_eq!(a.get(), b.get());
			assert_eq!(*a.local().expect("remote load"), 42);

			// hold the copies until every transfer is counted at the author
			let token = ctx.pull_public::<i32>(Some(1));
			assert_eq!(token.get(), GlobalPointer::GO_ON);
			drop(a);
			drop(b);
			ctx.push_reserved(GlobalPointer::GO_ON, 1);
		}
		_ => unreachable!(),
	});
}

#[test]
fn remote_load_fills_the_cache_once() {
	common::run_group(2, |rank, ctx| match rank {
		0 => {
			let p = ctx.make_public(String::from("hello-world"));
			p.push(1);
			// the daemon serves the load; the last release arrives in the
			// termination drain and erases the record
		}
		1 => {
			let p = ctx.pull_public::<String>(Some(0));
			assert!(!ctx.is_cached(p.get()));

			let first = p.local().expect("remote load");
			assert!(ctx.is_cached(p.get()));

			let second = p.local().expect("cache hit");
			assert_eq!(*first, "hello-world");
			assert_eq!(*second, "hello-world");
		}
		_ => unreachable!(),
	});
}

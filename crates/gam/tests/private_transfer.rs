//! Moving private pointers between executors.

mod common;

use std::io;

use gam::PrivatePtr;
use gam::proto::marshal::{Marshal, RegionSink, RegionSource};

/// An application type with its own wire layout.
#[derive(Debug, Clone, PartialEq)]
struct Samples {
	label: String,
	values: Vec<i32>,
}

impl Marshal for Samples {
	const WIRE_SIZE: Option<u64> = None;

	fn marshall(&self, sink: &mut RegionSink<'_>) -> io::Result<()> {
		self.label.marshall(sink)?;
		self.values.marshall(sink)
	}

	fn ingest(source: &mut RegionSource<'_>) -> io::Result<Self> {
		Ok(Samples {
			label: String::ingest(source)?,
			values: Vec::ingest(source)?,
		})
	}
}

#[test]
fn pingpong_across_three_ranks() {
	common::run_group(3, |rank, ctx| match rank {
		0 => {
			let mut p = ctx.make_private(42i32);
			p.push(1);
		}
		1 => {
			let mut p = ctx.pull_private::<i32>(Some(0));
			let mut child = p.local().expect("pulled pointer is owned");
			assert_eq!(*child, 42);
			*child = 44;
			let mut p: PrivatePtr<i32> = child.into();
			p.push(2);
		}
		2 => {
			let mut p = ctx.pull_private::<i32>(None);
			let gp = p.get();
			let child = p.local().expect("pulled pointer is owned");
			assert_eq!(*child, 44);
			drop(child);
			assert!(!ctx.is_mapped(gp));
		}
		_ => unreachable!(),
	});
}

#[test]
fn withdraw_moves_authorship_and_resets_the_old_author() {
	common::run_group(2, |rank, ctx| match rank {
		0 => {
			let mut p = ctx.make_private(42i32);
			let gp = p.get();
			p.push(1);
			// the withdraw on the other side erases this record
			common::wait_until("old author reset", || !ctx.is_mapped(gp));
		}
		1 => {
			let mut p = ctx.pull_private::<i32>(Some(0));
			let gp = p.get();
			assert!(ctx.am_owner(gp));
			assert!(!ctx.am_author(gp));

			let child = p.local().expect("pulled pointer is owned");
			assert_eq!(*child, 42);
			assert!(ctx.am_author(gp));

			drop(child);
			assert!(!ctx.is_mapped(gp));
		}
		_ => unreachable!(),
	});
}

#[test]
fn compound_payloads_cross_with_their_own_layout() {
	common::run_group(2, |rank, ctx| match rank {
		0 => {
			let mut p = ctx.make_private(vec![42i32; 10]);
			p.push(1);

			let mut back = ctx.pull_private::<Vec<i32>>(Some(1));
			let child = back.local().expect("returned pointer is owned");
			let mut expected = vec![42i32; 10];
			expected[0] = 43;
			assert_eq!(*child, expected);
		}
		1 => {
			let mut p = ctx.pull_private::<Vec<i32>>(Some(0));
			let mut child = p.local().expect("pulled pointer is owned");
			assert_eq!(*child, vec![42i32; 10]);
			child[0] = 43;
			let mut p: PrivatePtr<Vec<i32>> = child.into();
			p.push(0);
		}
		_ => unreachable!(),
	});
}

#[test]
fn user_defined_layouts_cross_intact() {
	common::run_group(2, |rank, ctx| match rank {
		0 => {
			let mut p = ctx.make_private(Samples {
				label: String::from("batch-7"),
				values: vec![42; 10],
			});
			p.push(1);
		}
		1 => {
			let mut p = ctx.pull_private::<Samples>(Some(0));
			let child = p.local().expect("pulled pointer is owned");
			assert_eq!(child.label, "batch-7");
			assert_eq!(child.values, vec![42; 10]);
		}
		_ => unreachable!(),
	});
}

#[test]
fn string_payloads_roundtrip() {
	common::run_group(2, |rank, ctx| match rank {
		0 => {
			let mut p = ctx.make_private(String::from("hello-world"));
			p.push(1);
		}
		1 => {
			let mut p = ctx.pull_private::<String>(Some(0));
			let child = p.local().expect("pulled pointer is owned");
			assert_eq!(&*child, "hello-world");
		}
		_ => unreachable!(),
	});
}

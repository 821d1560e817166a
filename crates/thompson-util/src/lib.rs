// newtyped u32 indices into an arena Vec. ids are handed out in push order and
// never reused, so an id is valid for exactly the arena that produced it
#[macro_export]
macro_rules! make_type_idx {
    ($vis:vis $type_idx_name:ident, $type_name:ty) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        $vis struct $type_idx_name(u32);

        impl $type_idx_name {
            #[allow(dead_code)]
            pub(crate) fn from_push(vec: &mut Vec<$type_name>, val: $type_name) -> $type_idx_name {
                let idx = $type_idx_name(vec.len() as u32);
                vec.push(val);
                idx
            }

            #[allow(dead_code)]
            pub(crate) fn from_index(index: usize) -> $type_idx_name {
                $type_idx_name(index as u32)
            }

            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl std::fmt::Display for $type_idx_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "S{}", self.0)
            }
        }

        impl std::ops::Index<$type_idx_name> for [$type_name] {
            type Output = $type_name;

            fn index(&self, index: $type_idx_name) -> &Self::Output {
                &self[index.0 as usize]
            }
        }

        impl std::ops::IndexMut<$type_idx_name> for [$type_name] {
            fn index_mut(&mut self, index: $type_idx_name) -> &mut Self::Output {
                &mut self[index.0 as usize]
            }
        }

        impl std::ops::Index<$type_idx_name> for Vec<$type_name> {
            type Output = $type_name;

            fn index(&self, index: $type_idx_name) -> &Self::Output {
                std::ops::Index::index(self.as_slice(), index)
            }
        }

        impl std::ops::IndexMut<$type_idx_name> for Vec<$type_name> {
            fn index_mut(&mut self, index: $type_idx_name) -> &mut Self::Output {
                std::ops::IndexMut::index_mut(self.as_mut_slice(), index)
            }
        }
    };
}

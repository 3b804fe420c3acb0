// Structural map and fold over the direct children of a node. The traits are implemented for the
// expression and statement types of each intermediate representation, and for the containers
// used to store children.

pub trait SMapAccum<T> {
    fn smap_accum_l_result<A, E>(
        self,
        acc: Result<A, E>,
        f: impl Fn(A, T) -> Result<(A, T), E>
    ) -> Result<(A, Self), E> where Self: Sized;

    fn smap_accum_l<A>(self, acc: A, f: impl Fn(A, T) -> (A, T)) -> (A, Self) where Self: Sized {
        match self.smap_accum_l_result(Ok::<A, ()>(acc), |acc, t| Ok(f(acc, t))) {
            Ok(r) => r,
            Err(()) => unreachable!()
        }
    }

    fn smap_result<E>(
        self,
        f: impl Fn(T) -> Result<T, E>
    ) -> Result<Self, E> where Self: Sized {
        let (_, t) = self.smap_accum_l_result(Ok(()), |_, t| Ok(((), f(t)?)))?;
        Ok(t)
    }

    fn smap(self, f: impl Fn(T) -> T) -> Self where Self: Sized {
        let (_, res) = self.smap_accum_l((), |_, x| ((), f(x)));
        res
    }
}

pub trait SFold<T> {
    fn sfold_result<A, E>(
        &self,
        acc: Result<A, E>,
        f: impl Fn(A, &T) -> Result<A, E>
    ) -> Result<A, E>;

    fn sfold<A>(&self, acc: A, f: impl Fn(A, &T) -> A) -> A {
        match self.sfold_result(Ok::<A, ()>(acc), |acc, t| Ok(f(acc, t))) {
            Ok(r) => r,
            Err(()) => unreachable!()
        }
    }
}

impl<T> SMapAccum<T> for Vec<T> {
    fn smap_accum_l_result<A, E>(
        self,
        acc: Result<A, E>,
        f: impl Fn(A, T) -> Result<(A, T), E>
    ) -> Result<(A, Self), E> {
        self.into_iter()
            .fold(Ok((acc?, vec![])), |acc, x| {
                let (acc, mut elems) = acc?;
                let (acc, x) = f(acc, x)?;
                elems.push(x);
                Ok((acc, elems))
            })
    }
}

impl<T> SMapAccum<T> for Option<T> {
    fn smap_accum_l_result<A, E>(
        self,
        acc: Result<A, E>,
        f: impl Fn(A, T) -> Result<(A, T), E>
    ) -> Result<(A, Self), E> {
        match self {
            Some(e) => {
                let (acc, e) = f(acc?, e)?;
                Ok((acc, Some(e)))
            },
            None => Ok((acc?, None))
        }
    }
}

impl<T> SFold<T> for Vec<T> {
    fn sfold_result<A, E>(
        &self,
        acc: Result<A, E>,
        f: impl Fn(A, &T) -> Result<A, E>
    ) -> Result<A, E> {
        self.iter().fold(acc, |acc, t| f(acc?, t))
    }
}

impl<T> SFold<T> for Option<T> {
    fn sfold_result<A, E>(
        &self,
        acc: Result<A, E>,
        f: impl Fn(A, &T) -> Result<A, E>
    ) -> Result<A, E> {
        match self {
            Some(e) => f(acc?, e),
            None => acc
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn smap_accum_threads_accumulator_left_to_right() {
        let (acc, v) = vec![1, 2, 3].smap_accum_l(0, |acc, x| (acc + x, acc));
        assert_eq!(acc, 6);
        assert_eq!(v, vec![0, 1, 3]);
    }

    #[test]
    fn smap_result_stops_at_first_error() {
        let r = vec![1, 2, 3].smap_result(|x| if x == 2 { Err(x) } else { Ok(x) });
        assert_eq!(r, Err(2));
    }

    #[test]
    fn sfold_option() {
        assert_eq!(Some(3).sfold(1, |acc, x| acc + x), 4);
        assert_eq!(None::<i64>.sfold(1, |acc, x| acc + x), 1);
    }
}
